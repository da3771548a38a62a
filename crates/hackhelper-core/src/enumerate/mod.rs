//! 子域名枚举任务与事件流协议
//!
//! 任务在后台线程执行，通过通道按发出顺序推送进度、错误和唯一一次最终结果；
//! 消费端把进度与错误追加到同一日志，收到结果后可导出为文本文件。
mod job;
mod protocol;
mod sources;
mod view;

pub use job::{find_subdomains, EnumerationJob};
pub use protocol::{
    decode_event, decode_request, encode_event, encode_request, FindSubdomainsRequest, JobEvent, EVENT_ERROR,
    EVENT_PROGRESS, EVENT_REQUEST, EVENT_RESULT, MISSING_DOMAIN,
};
pub use sources::{
    extract_subdomain, harvest_hosts, is_valid_domain, DnsResolver, DumpFileSource, Resolver, StaticSource,
    SubdomainSource, WordlistSource,
};
pub use view::{prepare_output_dir, Artifact, JobView};
