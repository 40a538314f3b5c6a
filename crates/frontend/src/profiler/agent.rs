//! Profiler client contract and the TCP agent implementation.

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use common::protocol::ProfilerRegistration;
use common::ProfilerError;

/// Connect/write timeout for the agent handshake.
pub const AGENT_TIMEOUT: Duration = Duration::from_secs(3);

/// Identity the profile is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTarget {
    pub service: String,
    pub version: String,
}

impl ProfileTarget {
    /// This binary's service name and package version.
    pub fn frontend() -> Self {
        Self {
            service: "frontend".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Starts continuous profiling for the process.
///
/// `start` may block briefly; callers run it off the async executor.
#[cfg_attr(test, mockall::automock)]
pub trait ProfilerClient: Send + Sync {
    fn start(&self, target: &ProfileTarget) -> Result<(), ProfilerError>;
}

/// Registers the process with a profiling agent listening on TCP.
///
/// The handshake is a single JSON line carrying [`ProfilerRegistration`].
#[derive(Debug, Clone)]
pub struct AgentProfiler {
    endpoint: Option<String>,
    timeout: Duration,
}

impl AgentProfiler {
    pub fn new(endpoint: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.map(str::to_owned),
            timeout: AGENT_TIMEOUT,
        }
    }
}

impl ProfilerClient for AgentProfiler {
    fn start(&self, target: &ProfileTarget) -> Result<(), ProfilerError> {
        let endpoint = self.endpoint.as_deref().ok_or(ProfilerError::NotConfigured)?;
        let unavailable = |reason: String| ProfilerError::Unavailable(format!("{endpoint}: {reason}"));

        let addr = endpoint
            .to_socket_addrs()
            .map_err(|e| unavailable(e.to_string()))?
            .next()
            .ok_or_else(|| unavailable("resolved to no addresses".into()))?;
        let mut stream =
            TcpStream::connect_timeout(&addr, self.timeout).map_err(|e| unavailable(e.to_string()))?;

        let registration = ProfilerRegistration {
            service: target.service.clone(),
            version: target.version.clone(),
        };
        let mut line = serde_json::to_string(&registration)
            .map_err(|e| ProfilerError::Registration(e.to_string()))?;
        line.push('\n');

        send_line(&mut stream, &line, self.timeout)
            .map_err(|e| ProfilerError::Registration(e.to_string()))
    }
}

fn send_line(stream: &mut TcpStream, line: &str, timeout: Duration) -> std::io::Result<()> {
    stream.set_write_timeout(Some(timeout))?;
    stream.write_all(line.as_bytes())?;
    stream.flush()
}
