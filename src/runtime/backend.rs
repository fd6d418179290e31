//! Backend membership and server state operations.
//!
//! # Responsibilities
//! - Issue the runtime API commands for one backend
//! - Parse `show servers state` output into members
//! - Resolve server hosts to literal addresses for `add server`
//!
//! # Design Decisions
//! - Field offsets in `show servers state` output are a protocol
//!   contract: srv_name at 3, srv_op_state at 5, srv_port at 18
//! - Every write is idempotent from the caller's perspective;
//!   reissuing a command against an already-correct backend is a no-op

use async_trait::async_trait;

use crate::config::schema::Endpoint;
use crate::runtime::socket::RuntimeSocket;
use crate::runtime::RuntimeError;

const HEADER_LINES: usize = 2;
const FIELD_HOST: usize = 3;
const FIELD_STATE: usize = 5;
const FIELD_PORT: usize = 18;

/// Health states HAProxy reports and accepts for a backend server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// In rotation.
    Ready,
    /// No new sessions; existing sessions allowed to finish.
    Drain,
    /// Out of rotation.
    Maint,
    /// Unparsed state code.
    Unknown,
}

impl HealthState {
    /// Map a numeric srv_op_state code from `show servers state`.
    fn from_code(code: &str) -> Self {
        match code {
            "0" => HealthState::Maint,
            "1" => HealthState::Drain,
            "2" => HealthState::Ready,
            other => {
                tracing::warn!(code = other, "unknown backend server state code");
                HealthState::Unknown
            }
        }
    }

    /// Argument for `set server ... state`. `Unknown` is not settable.
    fn command_arg(self) -> Option<&'static str> {
        match self {
            HealthState::Ready => Some("ready"),
            HealthState::Drain => Some("drain"),
            HealthState::Maint => Some("maint"),
            HealthState::Unknown => None,
        }
    }
}

/// One server registered in an HAProxy backend.
#[derive(Debug, Clone)]
pub struct BackendMember {
    /// Server name as registered (the upstream host name).
    pub host: String,
    pub port: u16,
    pub state: HealthState,
}

impl BackendMember {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }
}

/// The backend operations the reconciliation engine drives.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn list_members(&self, cluster: &str) -> Result<Vec<BackendMember>, RuntimeError>;
    async fn add_member(&self, cluster: &str, server: &Endpoint) -> Result<(), RuntimeError>;
    async fn remove_member(&self, cluster: &str, host: &str) -> Result<(), RuntimeError>;
    async fn set_state(
        &self,
        cluster: &str,
        host: &str,
        state: HealthState,
    ) -> Result<(), RuntimeError>;
    async fn shutdown_sessions(&self, cluster: &str, host: &str) -> Result<(), RuntimeError>;
}

/// `BackendApi` implementation over the HAProxy runtime socket.
///
/// The cluster name is the HAProxy backend name.
#[derive(Debug, Clone)]
pub struct HaproxyBackend {
    socket: RuntimeSocket,
}

impl HaproxyBackend {
    pub fn new(socket: RuntimeSocket) -> Self {
        Self { socket }
    }

    async fn resolve_host(&self, host: &str) -> Result<std::net::IpAddr, RuntimeError> {
        let mut addrs = tokio::net::lookup_host((host, 0u16)).await.map_err(|err| {
            RuntimeError::DnsResolutionFailed {
                host: host.to_string(),
                source: Some(err),
            }
        })?;
        match addrs.next() {
            Some(addr) => Ok(addr.ip()),
            None => Err(RuntimeError::DnsResolutionFailed {
                host: host.to_string(),
                source: None,
            }),
        }
    }
}

#[async_trait]
impl BackendApi for HaproxyBackend {
    async fn list_members(&self, cluster: &str) -> Result<Vec<BackendMember>, RuntimeError> {
        let raw = self
            .socket
            .send(&format!("show servers state {}", cluster))
            .await?;
        Ok(parse_servers_state(&raw))
    }

    async fn add_member(&self, cluster: &str, server: &Endpoint) -> Result<(), RuntimeError> {
        // `add server` wants a literal address, not a name.
        let ip = self.resolve_host(&server.host).await?;
        let response = self
            .socket
            .send(&format!(
                "add server {}/{} {}:{}",
                cluster, server.host, ip, server.port
            ))
            .await?;
        tracing::info!(
            cluster,
            server = %server,
            %ip,
            response = response.trim(),
            "added server to backend"
        );
        Ok(())
    }

    async fn remove_member(&self, cluster: &str, host: &str) -> Result<(), RuntimeError> {
        self.socket
            .send(&format!("del server {}/{}", cluster, host))
            .await?;
        tracing::info!(cluster, host, "removed server from backend");
        Ok(())
    }

    async fn set_state(
        &self,
        cluster: &str,
        host: &str,
        state: HealthState,
    ) -> Result<(), RuntimeError> {
        let Some(arg) = state.command_arg() else {
            tracing::warn!(cluster, host, "refusing to set server to unknown state");
            return Ok(());
        };
        self.socket
            .send(&format!("set server {}/{} state {}", cluster, host, arg))
            .await?;
        tracing::info!(cluster, host, state = arg, "set server state");
        Ok(())
    }

    async fn shutdown_sessions(&self, cluster: &str, host: &str) -> Result<(), RuntimeError> {
        self.socket
            .send(&format!("shutdown sessions server {}/{}", cluster, host))
            .await?;
        tracing::info!(cluster, host, "shut down server sessions");
        Ok(())
    }
}

/// Parse `show servers state` output.
///
/// The first two lines are the format version and the column header.
pub(crate) fn parse_servers_state(raw: &str) -> Vec<BackendMember> {
    raw.lines()
        .skip(HEADER_LINES)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let (Some(&host), Some(&state), Some(&port)) = (
                fields.get(FIELD_HOST),
                fields.get(FIELD_STATE),
                fields.get(FIELD_PORT),
            ) else {
                tracing::warn!(line, "short line in servers state output");
                return None;
            };
            let Ok(port) = port.parse::<u16>() else {
                tracing::warn!(line, port, "unparseable port in servers state output");
                return None;
            };
            Some(BackendMember {
                host: host.to_string(),
                port,
                state: HealthState::from_code(state),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVERS_STATE: &str = "\
1
# be_id be_name srv_id srv_name srv_addr srv_op_state srv_admin_state srv_uweight srv_iweight srv_time_since_last_change srv_check_status srv_check_result srv_check_health srv_check_state srv_agent_state bk_f_forced_id srv_f_forced_id srv_fqdn srv_port srv_record srv_use_ssl srv_check_port srv_check_addr srv_agent_addr srv_agent_port
3 cache 1 10.0.0.1 10.0.0.1 2 0 1 1 5 1 0 2 0 0 0 0 - 6379 - 0 0 - - 0
3 cache 2 10.0.0.2 10.0.0.2 0 0 1 1 5 1 0 2 0 0 0 0 - 6379 - 0 0 - - 0
3 cache 3 10.0.0.3 10.0.0.3 1 0 1 1 5 1 0 2 0 0 0 0 - 6380 - 0 0 - - 0
";

    #[test]
    fn test_parse_servers_state() {
        let members = parse_servers_state(SERVERS_STATE);
        assert_eq!(members.len(), 3);

        assert_eq!(members[0].host, "10.0.0.1");
        assert_eq!(members[0].port, 6379);
        assert_eq!(members[0].state, HealthState::Ready);

        assert_eq!(members[1].state, HealthState::Maint);

        assert_eq!(members[2].port, 6380);
        assert_eq!(members[2].state, HealthState::Drain);
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let raw = "1\n# header\nshort line\n";
        assert!(parse_servers_state(raw).is_empty());

        let empty = "1\n# header\n\n\n";
        assert!(parse_servers_state(empty).is_empty());
    }

    #[test]
    fn test_unknown_state_code() {
        let raw = SERVERS_STATE.replace(
            "3 cache 1 10.0.0.1 10.0.0.1 2",
            "3 cache 1 10.0.0.1 10.0.0.1 9",
        );
        let members = parse_servers_state(&raw);
        assert_eq!(members[0].state, HealthState::Unknown);
    }

    #[test]
    fn test_state_command_args() {
        assert_eq!(HealthState::Ready.command_arg(), Some("ready"));
        assert_eq!(HealthState::Drain.command_arg(), Some("drain"));
        assert_eq!(HealthState::Maint.command_arg(), Some("maint"));
        assert_eq!(HealthState::Unknown.command_arg(), None);
    }
}
