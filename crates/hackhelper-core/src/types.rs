//! 公共类型（对外暴露）
use serde::Serialize;

/// 输出项结构（对应 JSON 数组的单个元素）
#[derive(Debug, Clone, Serialize)]
pub struct OutputItem<'a> {
    pub file: &'a str,
    pub offset: usize,
    pub excerpt: &'a str,
}
