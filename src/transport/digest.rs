//! HTTP Digest 认证（RFC 7616，MD5 + qop=auth）
//!
//! PrusaLink 的 GET/PUT 请求使用 Digest 认证。质询在会话内缓存，
//! 之后的请求直接携带 Authorization 头，只有在服务端返回 401 时才重新质询。

use crate::error::ApiError;
use md5::{Digest, Md5};
use rand::Rng;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// 服务端发出的 Digest 质询
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub qop_auth: bool,
    pub stale: bool,
}

fn param_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z0-9_-]+)\s*=\s*(?:"([^"]*)"|([^,\s]+))"#)
            .expect("digest parameter regex is valid")
    })
}

impl DigestChallenge {
    /// 解析 WWW-Authenticate 头
    pub fn parse(header: &str) -> Result<Self, ApiError> {
        let header = header.trim();
        let rest = header
            .strip_prefix("Digest")
            .or_else(|| header.strip_prefix("digest"))
            .ok_or_else(|| ApiError::Auth(format!("不支持的认证方式: {}", header)))?;

        let params: HashMap<String, String> = param_regex()
            .captures_iter(rest)
            .filter_map(|cap| {
                let key = cap.get(1)?.as_str().to_lowercase();
                let value = cap.get(2).or_else(|| cap.get(3))?.as_str().to_string();
                Some((key, value))
            })
            .collect();

        if let Some(algorithm) = params.get("algorithm") {
            if !algorithm.eq_ignore_ascii_case("MD5") {
                return Err(ApiError::Auth(format!("不支持的摘要算法: {}", algorithm)));
            }
        }

        let nonce = params
            .get("nonce")
            .cloned()
            .ok_or_else(|| ApiError::Auth("质询缺少 nonce".to_string()))?;

        Ok(Self {
            realm: params.get("realm").cloned().unwrap_or_default(),
            nonce,
            opaque: params.get("opaque").cloned(),
            qop_auth: params
                .get("qop")
                .map(|q| q.split(',').any(|v| v.trim() == "auth"))
                .unwrap_or(false),
            stale: params
                .get("stale")
                .map(|s| s.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// 会话内的 Digest 状态：缓存的质询和 nonce 计数
#[derive(Debug, Default)]
pub struct DigestSession {
    challenge: Option<DigestChallenge>,
    nonce_count: u32,
}

impl DigestSession {
    /// 保存新的质询，nonce 改变时计数归零
    pub fn update(&mut self, challenge: DigestChallenge) {
        if self.challenge.as_ref().map(|c| &c.nonce) != Some(&challenge.nonce) {
            self.nonce_count = 0;
        }
        self.challenge = Some(challenge);
    }

    /// 为一次请求生成 Authorization 头，没有质询时返回 None
    pub fn authorization(
        &mut self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
    ) -> Option<String> {
        let cnonce = format!("{:016x}", rand::thread_rng().gen::<u64>());
        self.authorization_with_cnonce(username, password, method, uri, &cnonce)
    }

    fn authorization_with_cnonce(
        &mut self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> Option<String> {
        let challenge = self.challenge.as_ref()?;
        self.nonce_count += 1;
        let nc = format!("{:08x}", self.nonce_count);

        let ha1 = md5_hex(&format!("{}:{}:{}", username, challenge.realm, password));
        let ha2 = md5_hex(&format!("{}:{}", method, uri));

        let mut header = if challenge.qop_auth {
            let response = md5_hex(&format!(
                "{}:{}:{}:{}:auth:{}",
                ha1, challenge.nonce, nc, cnonce, ha2
            ));
            format!(
                r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", algorithm=MD5, qop=auth, nc={}, cnonce="{}", response="{}""#,
                username, challenge.realm, challenge.nonce, uri, nc, cnonce, response
            )
        } else {
            let response = md5_hex(&format!("{}:{}:{}", ha1, challenge.nonce, ha2));
            format!(
                r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", algorithm=MD5, response="{}""#,
                username, challenge.realm, challenge.nonce, uri, response
            )
        };

        if let Some(opaque) = &challenge.opaque {
            header.push_str(&format!(r#", opaque="{}""#, opaque));
        }

        Some(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_challenge() {
        let challenge = DigestChallenge::parse(
            r#"Digest realm="Printer API", nonce="3fd12a9c", qop="auth", stale=FALSE"#,
        )
        .unwrap();

        assert_eq!(challenge.realm, "Printer API");
        assert_eq!(challenge.nonce, "3fd12a9c");
        assert!(challenge.qop_auth);
        assert!(!challenge.stale);
        assert_eq!(challenge.opaque, None);
    }

    #[test]
    fn test_parse_rejects_basic() {
        assert!(DigestChallenge::parse(r#"Basic realm="x""#).is_err());
    }

    #[test]
    fn test_rfc2617_example_response() {
        // RFC 2617 3.5 的示例
        let mut session = DigestSession::default();
        session.update(
            DigestChallenge::parse(
                r#"Digest realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#,
            )
            .unwrap(),
        );

        let header = session
            .authorization_with_cnonce(
                "Mufasa",
                "Circle Of Life",
                "GET",
                "/dir/index.html",
                "0a4f113b",
            )
            .unwrap();

        assert!(header.contains(r#"response="6629fae49393a05397450978507c4ef1""#));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains(r#"opaque="5ccc069c403ebaf9f0171e9517f40e41""#));
    }

    #[test]
    fn test_nonce_count_resets_on_new_nonce() {
        let mut session = DigestSession::default();
        assert!(session.authorization("u", "p", "GET", "/").is_none());

        session.update(DigestChallenge::parse(r#"Digest realm="r", nonce="a", qop="auth""#).unwrap());
        session.authorization("u", "p", "GET", "/");
        let second = session.authorization("u", "p", "GET", "/").unwrap();
        assert!(second.contains("nc=00000002"));

        session.update(DigestChallenge::parse(r#"Digest realm="r", nonce="b", qop="auth""#).unwrap());
        let fresh = session.authorization("u", "p", "GET", "/").unwrap();
        assert!(fresh.contains("nc=00000001"));
    }
}
