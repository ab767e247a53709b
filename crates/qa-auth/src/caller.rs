use std::net::IpAddr;

use axum::http::HeaderMap;

use crate::api_key::{key_prefix, parse_bearer};

pub const MAX_AGENT_NAME_CHARS: usize = 128;

/// 按优先级查找的 agent 名称请求头
const AGENT_HEADERS: [&str; 4] = [
    "x-agent-name",
    "x-mcp-client-name",
    "mcp-client-name",
    "x-client-name",
];

/// 反向代理写入的客户端地址头，按优先级查找；`x-forwarded-for` 只取最左侧一段
const CLIENT_IP_HEADERS: [&str; 4] = [
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip",
    "x-appengine-user-ip",
];

/// 从请求中提取的调用方信息，用于策略判断和配额计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    /// 原始 `Authorization` 头，未校验
    pub authorization: Option<String>,
    pub agent_name: Option<String>,
    /// 代理头里的客户端地址，没有时为连接的对端地址
    pub remote_ip: Option<IpAddr>,
}

impl CallerIdentity {
    pub fn from_headers(headers: &HeaderMap, peer_ip: Option<IpAddr>) -> Self {
        let authorization = header_str(headers, "authorization").map(str::to_string);
        // 取第一个出现的头，即使它的值为空
        let agent_name = AGENT_HEADERS
            .iter()
            .find_map(|name| headers.get(*name))
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| v.chars().take(MAX_AGENT_NAME_CHARS).collect());
        Self {
            authorization,
            agent_name,
            remote_ip: forwarded_ip(headers).or(peer_ip),
        }
    }

    /// 去空白并转小写后的 agent 名称
    pub fn normalized_agent(&self) -> Option<String> {
        self.agent_name
            .as_deref()
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
    }

    /// 配额计数键：API 密钥前缀 → agent 名称 → 网络地址
    pub fn quota_key(&self) -> String {
        let token = self
            .authorization
            .as_deref()
            .and_then(parse_bearer)
            .filter(|t| !t.is_empty());
        if let Some(token) = token {
            return format!("key:{}", key_prefix(token));
        }
        if let Some(agent) = self.normalized_agent() {
            return format!("agent:{}", agent);
        }
        match self.remote_ip {
            Some(ip) => format!("ip:{}", ip),
            None => "ip:unknown".to_string(),
        }
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    CLIENT_IP_HEADERS.iter().find_map(|name| {
        let value = header_str(headers, name)?;
        value.split(',').next()?.trim().parse().ok()
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
