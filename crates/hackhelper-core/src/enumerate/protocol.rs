//! 事件协议：每条消息一行 JSON，形如 `{"event": <名称>, "data": <载荷>}`
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HarnessError;

pub const EVENT_REQUEST: &str = "find-subdomains";
pub const EVENT_PROGRESS: &str = "find-subdomains_progress";
pub const EVENT_ERROR: &str = "find-subdomains_error";
pub const EVENT_RESULT: &str = "find-subdomains_result";

/// 请求缺少 domain 字段时回送的错误消息
pub const MISSING_DOMAIN: &str = "Missing 'domain' query parameter";

/// 启动枚举任务的请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindSubdomainsRequest {
    pub domain: String,
}

/// 任务向消费端推送的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum JobEvent {
    /// 可读的进度描述
    #[serde(rename = "find-subdomains_progress")]
    Progress(String),
    /// 可读的错误描述（不终止任务）
    #[serde(rename = "find-subdomains_error")]
    Error(String),
    /// 最终结果：发现的子域名列表
    #[serde(rename = "find-subdomains_result")]
    Result(Vec<String>),
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Progress(_) => EVENT_PROGRESS,
            JobEvent::Error(_) => EVENT_ERROR,
            JobEvent::Result(_) => EVENT_RESULT,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Result(_))
    }
}

pub fn encode_event(event: &JobEvent) -> Result<String, HarnessError> {
    serde_json::to_string(event).map_err(|e| HarnessError::Protocol(e.to_string()))
}

pub fn decode_event(line: &str) -> Result<JobEvent, HarnessError> {
    serde_json::from_str(line.trim()).map_err(|e| HarnessError::Protocol(e.to_string()))
}

pub fn encode_request(req: &FindSubdomainsRequest) -> Result<String, HarnessError> {
    let msg = serde_json::json!({ "event": EVENT_REQUEST, "data": req });
    serde_json::to_string(&msg).map_err(|e| HarnessError::Protocol(e.to_string()))
}

/// 解析请求行；缺少 domain 时错误消息为 [`MISSING_DOMAIN`]
pub fn decode_request(line: &str) -> Result<FindSubdomainsRequest, HarnessError> {
    let msg: Value = serde_json::from_str(line.trim()).map_err(|e| HarnessError::Protocol(e.to_string()))?;
    match msg.get("event").and_then(Value::as_str) {
        Some(EVENT_REQUEST) => {}
        Some(other) => return Err(HarnessError::Protocol(format!("unexpected event {other:?}"))),
        None => return Err(HarnessError::Protocol("message has no event name".to_string())),
    }
    let domain = msg
        .get("data")
        .and_then(|d| d.get("domain"))
        .ok_or_else(|| HarnessError::Protocol(MISSING_DOMAIN.to_string()))?;
    let domain = domain
        .as_str()
        .ok_or_else(|| HarnessError::Protocol("'domain' must be a string".to_string()))?;
    Ok(FindSubdomainsRequest { domain: domain.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_format() {
        let line = encode_event(&JobEvent::Progress("Searching 'crt.sh'".into())).unwrap();
        assert_eq!(line, r#"{"event":"find-subdomains_progress","data":"Searching 'crt.sh'"}"#);

        let res = decode_event(r#"{"event":"find-subdomains_result","data":["a.example.com","b.example.com"]}"#).unwrap();
        assert_eq!(res, JobEvent::Result(vec!["a.example.com".into(), "b.example.com".into()]));
        assert!(res.is_terminal());
        assert_eq!(res.name(), EVENT_RESULT);
    }

    #[test]
    fn unknown_event_is_protocol_error() {
        assert!(matches!(decode_event(r#"{"event":"nope","data":1}"#), Err(HarnessError::Protocol(_))));
        assert!(matches!(decode_event("not json"), Err(HarnessError::Protocol(_))));
    }

    #[test]
    fn request_round_trip_and_missing_domain() {
        let req = FindSubdomainsRequest { domain: "example.com".into() };
        let line = encode_request(&req).unwrap();
        assert_eq!(decode_request(&line).unwrap(), req);

        match decode_request(r#"{"event":"find-subdomains","data":{}}"#) {
            Err(HarnessError::Protocol(msg)) => assert_eq!(msg, MISSING_DOMAIN),
            other => panic!("unexpected {other:?}"),
        }
        assert!(decode_request(r#"{"event":"find-subdomains_result","data":[]}"#).is_err());
    }
}
