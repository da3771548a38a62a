//! 快捷键分派与注入动作
//!
//! 单一监听入口：按键组合查表得到动作（注入 / 扫描），再对当前焦点或页面文本执行。
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::HarnessError;
use crate::excerpt::ExcerptScanner;

/// 快捷键可触发的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// 把探针标记追加到当前输入框
    Inject,
    /// 在页面文本中查找残留的探针标记
    Scan,
}

/// 按键组合；`code` 使用物理键名（如 `KeyF`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    pub code: String,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl KeyChord {
    pub fn ctrl_alt(code: &str) -> Self {
        Self { code: code.to_string(), ctrl: true, alt: true, shift: false }
    }

    /// 绑定是否接受该按键事件：ctrl/alt 必须一致，shift 仅在绑定要求时检查
    pub fn accepts(&self, event: &KeyChord) -> bool {
        self.code == event.code && self.ctrl == event.ctrl && self.alt == event.alt && (!self.shift || event.shift)
    }
}

impl FromStr for KeyChord {
    type Err = HarnessError;

    /// 解析 `ctrl+alt+KeyF` 形式（修饰键不区分大小写）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chord = KeyChord { code: String::new(), ctrl: false, alt: false, shift: false };
        for part in s.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => chord.ctrl = true,
                "alt" | "option" => chord.alt = true,
                "shift" => chord.shift = true,
                "" => return Err(HarnessError::invalid(format!("empty key in chord {s:?}"))),
                _ if chord.code.is_empty() => chord.code = part.to_string(),
                _ => return Err(HarnessError::invalid(format!("chord {s:?} names more than one key"))),
            }
        }
        if chord.code.is_empty() {
            return Err(HarnessError::invalid(format!("chord {s:?} has no key")));
        }
        Ok(chord)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        f.write_str(&self.code)
    }
}

/// 快捷键表（按绑定顺序查找）
#[derive(Debug, Clone)]
pub struct ShortcutTable {
    bindings: Vec<(KeyChord, Action)>,
}

impl Default for ShortcutTable {
    /// Ctrl+Alt+P 注入，Ctrl+Alt+F 扫描
    fn default() -> Self {
        Self {
            bindings: vec![
                (KeyChord::ctrl_alt("KeyP"), Action::Inject),
                (KeyChord::ctrl_alt("KeyF"), Action::Scan),
            ],
        }
    }
}

impl ShortcutTable {
    /// 绑定按键；同一组合已存在时覆盖
    pub fn bind(&mut self, chord: KeyChord, action: Action) {
        match self.bindings.iter_mut().find(|(c, _)| *c == chord) {
            Some(slot) => slot.1 = action,
            None => self.bindings.push((chord, action)),
        }
    }

    pub fn dispatch(&self, event: &KeyChord) -> Option<Action> {
        self.bindings.iter().find(|(c, _)| c.accepts(event)).map(|(_, a)| *a)
    }

    pub fn bindings(&self) -> &[(KeyChord, Action)] {
        &self.bindings
    }
}

/// 当前获得焦点的元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Focus {
    /// 可写入的输入框
    Input { value: String },
    /// 其他不接受文本的元素
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    Injected,
    NotAnInput,
}

/// 把标记追加到输入框的值末尾；非输入元素保持不变
pub fn inject(focus: &mut Focus, marker: &str) -> InjectOutcome {
    match focus {
        Focus::Input { value } => {
            debug!("typing");
            value.push_str(marker);
            InjectOutcome::Injected
        }
        Focus::Other => {
            debug!("focused element is not an input");
            InjectOutcome::NotAnInput
        }
    }
}

/// 一次扫描的展示结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub excerpts: Vec<String>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.excerpts.is_empty()
    }

    /// 面向用户的逐行消息
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.excerpts.iter().map(|e| format!("Found possible XSS!\n  {e}")).collect();
        if self.is_clean() {
            lines.push("No successful injections found".to_string());
        }
        lines.push("Search completed".to_string());
        lines
    }
}

/// 按键处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Injected(InjectOutcome),
    Scanned(ScanReport),
}

/// 快捷键监听器：查表后对焦点或页面执行动作
#[derive(Debug, Clone)]
pub struct Harness {
    scanner: ExcerptScanner,
    shortcuts: ShortcutTable,
}

impl Harness {
    pub fn new(scanner: ExcerptScanner, shortcuts: ShortcutTable) -> Self {
        Self { scanner, shortcuts }
    }

    pub fn scanner(&self) -> &ExcerptScanner {
        &self.scanner
    }

    /// 未绑定的组合返回 None
    pub fn handle(&self, event: &KeyChord, focus: &mut Focus, page: &str) -> Option<Outcome> {
        let action = self.shortcuts.dispatch(event)?;
        debug!(%event, ?action, "shortcut matched");
        Some(match action {
            Action::Inject => Outcome::Injected(inject(focus, self.scanner.marker())),
            Action::Scan => {
                info!("searching for successful XSS attempts");
                Outcome::Scanned(ScanReport { excerpts: self.scanner.scan(page) })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excerpt::{DEFAULT_MARGIN, PROBE_MARKER};

    fn harness() -> Harness {
        Harness::new(ExcerptScanner::new(PROBE_MARKER, DEFAULT_MARGIN).unwrap(), ShortcutTable::default())
    }

    #[test]
    fn parses_chords() {
        let c: KeyChord = "ctrl+alt+KeyF".parse().unwrap();
        assert_eq!(c, KeyChord::ctrl_alt("KeyF"));
        assert_eq!(c.to_string(), "Ctrl+Alt+KeyF");

        let s: KeyChord = "Shift + KeyX".parse().unwrap();
        assert!(s.shift && !s.ctrl && !s.alt);

        assert!("ctrl+alt".parse::<KeyChord>().is_err());
        assert!("ctrl++KeyF".parse::<KeyChord>().is_err());
        assert!("KeyA+KeyB".parse::<KeyChord>().is_err());
    }

    #[test]
    fn default_table_dispatch() {
        let t = ShortcutTable::default();
        assert_eq!(t.dispatch(&KeyChord::ctrl_alt("KeyP")), Some(Action::Inject));
        assert_eq!(t.dispatch(&KeyChord::ctrl_alt("KeyF")), Some(Action::Scan));
        assert_eq!(t.dispatch(&"ctrl+KeyF".parse().unwrap()), None);
        // 额外按住 shift 仍然触发
        assert_eq!(t.dispatch(&"ctrl+alt+shift+KeyF".parse().unwrap()), Some(Action::Scan));
    }

    #[test]
    fn bind_overrides_existing_chord() {
        let mut t = ShortcutTable::default();
        t.bind(KeyChord::ctrl_alt("KeyF"), Action::Inject);
        assert_eq!(t.bindings().len(), 2);
        assert_eq!(t.dispatch(&KeyChord::ctrl_alt("KeyF")), Some(Action::Inject));
    }

    #[test]
    fn inject_only_touches_inputs() {
        let mut input = Focus::Input { value: "name=".to_string() };
        assert_eq!(inject(&mut input, PROBE_MARKER), InjectOutcome::Injected);
        assert_eq!(input, Focus::Input { value: format!("name={PROBE_MARKER}") });

        let mut other = Focus::Other;
        assert_eq!(inject(&mut other, PROBE_MARKER), InjectOutcome::NotAnInput);
        assert_eq!(other, Focus::Other);
    }

    #[test]
    fn handle_runs_scan_and_reports() {
        let h = harness();
        let mut focus = Focus::Other;
        let page = format!("You entered '{PROBE_MARKER}'");
        let out = h.handle(&KeyChord::ctrl_alt("KeyF"), &mut focus, &page).unwrap();
        let Outcome::Scanned(report) = out else { panic!("expected scan outcome") };
        assert_eq!(report.excerpts, vec![format!("... entered '{PROBE_MARKER}'")]);
        assert_eq!(report.lines().last().unwrap(), "Search completed");
    }

    #[test]
    fn clean_report_lines() {
        let report = ScanReport { excerpts: Vec::new() };
        assert_eq!(report.lines(), vec!["No successful injections found", "Search completed"]);
    }

    #[test]
    fn unbound_chord_does_nothing() {
        let mut focus = Focus::Input { value: String::new() };
        assert!(harness().handle(&KeyChord::ctrl_alt("KeyZ"), &mut focus, "").is_none());
        assert_eq!(focus, Focus::Input { value: String::new() });
    }
}
