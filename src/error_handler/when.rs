//! Declarative conditions selecting which error handler renders an error.
//!
//! ```json
//! "when": [
//!   {
//!     "error": ["unauthorized", "forbidden"],
//!     "request": {
//!       "cidr": ["10.0.0.0/8"],
//!       "header": {"accept": ["text/html"]}
//!     }
//!   }
//! ]
//! ```
//!
//! An empty list matches every error. Otherwise one matching entry is
//! enough; inside an entry every given criterion must hold.

use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;
use std::str::FromStr;

use crate::pipeline::error::{DecisionError, DecisionResult, ErrorClass, HandlerKind};
use crate::pipeline::request::DecisionRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WhenCondition {
    /// Error class names, e.g. `unauthorized`.
    pub error: Vec<String>,
    pub request: Option<RequestCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RequestCondition {
    pub cidr: Vec<String>,
    pub header: HeaderCondition,
    /// Also test addresses listed in `X-Forwarded-For`.
    pub honor_forwarded_for: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeaderCondition {
    pub content_type: Vec<String>,
    pub accept: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WhenOnly {
    #[serde(default)]
    when: Vec<WhenCondition>,
}

/// Reads and checks the `when` block of an error handler config.
pub fn decode(id: &str, config: &Value) -> DecisionResult<Vec<WhenCondition>> {
    let conditions = match config {
        Value::Null => Vec::new(),
        other => serde_json::from_value::<WhenOnly>(other.clone())
            .map_err(|e| DecisionError::misconfigured(HandlerKind::ErrorHandler, id, e))?
            .when,
    };

    for condition in &conditions {
        if let Some(name) = condition.error.iter().find(|n| ErrorClass::from_name(n).is_none()) {
            return Err(DecisionError::misconfigured(
                HandlerKind::ErrorHandler,
                id,
                format!("unknown error class \"{name}\" in when.error"),
            ));
        }
        if let Some(request) = &condition.request {
            for cidr in &request.cidr {
                Cidr::from_str(cidr)
                    .map_err(|e| DecisionError::misconfigured(HandlerKind::ErrorHandler, id, e))?;
            }
        }
    }
    Ok(conditions)
}

/// True if `conditions` select this handler for `error` on `request`.
pub fn matches(conditions: &[WhenCondition], request: &DecisionRequest, error: &DecisionError) -> bool {
    conditions.is_empty() || conditions.iter().any(|c| condition_matches(c, request, error))
}

fn condition_matches(condition: &WhenCondition, request: &DecisionRequest, error: &DecisionError) -> bool {
    if !condition.error.is_empty() {
        let class = error.class().name();
        if !condition.error.iter().any(|n| n == class) {
            return false;
        }
    }

    let Some(req) = &condition.request else {
        return true;
    };

    if !req.cidr.is_empty() {
        let ranges: Vec<Cidr> = req.cidr.iter().filter_map(|c| c.parse().ok()).collect();
        let inside = request
            .client_ips(req.honor_forwarded_for)
            .into_iter()
            .any(|ip| ranges.iter().any(|r| r.contains(ip)));
        if !inside {
            return false;
        }
    }

    if !req.header.content_type.is_empty() {
        let Some(actual) = request.header("content-type").map(media_type) else {
            return false;
        };
        if !req.header.content_type.iter().any(|t| mime_matches(t, &actual)) {
            return false;
        }
    }

    if !req.header.accept.is_empty() {
        let accepted: Vec<String> = match request.header("accept") {
            Some(raw) => raw
                .split(',')
                .filter(|r| quality(r) > 0.0)
                .map(media_type)
                .filter(|r| !r.is_empty())
                .collect(),
            None => vec!["*/*".to_string()],
        };
        if !req
            .header
            .accept
            .iter()
            .any(|wanted| accepted.iter().any(|range| mime_matches(wanted, range)))
        {
            return false;
        }
    }

    true
}

/// Lowercased `type/subtype` without parameters.
/// The `q` parameter of an Accept range; ranges without one weigh 1.
fn quality(range: &str) -> f32 {
    range
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
        .map(|(_, value)| value.trim().parse::<f32>().unwrap_or(0.0))
        .unwrap_or(1.0)
}

fn media_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// Compares two media types where either side may use `*` wildcards.
fn mime_matches(a: &str, b: &str) -> bool {
    let a = media_type(a);
    let (a_type, a_sub) = a.split_once('/').unwrap_or((a.as_str(), "*"));
    let (b_type, b_sub) = b.split_once('/').unwrap_or((b, "*"));
    let part = |x: &str, y: &str| x == "*" || y == "*" || x == y;
    part(a_type, b_type) && part(a_sub, b_sub)
}

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = match (self.network, ip) {
            (IpAddr::V4(_), IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => return false,
            },
            (_, ip) => ip,
        };
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s.split_once('/').unwrap_or((s, ""));
        let network: IpAddr = addr
            .trim()
            .parse()
            .map_err(|_| format!("\"{s}\" is not a valid CIDR"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = if prefix.is_empty() {
            max
        } else {
            prefix
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("\"{s}\" has an invalid prefix length"))?
        };
        Ok(Self { network, prefix })
    }
}
