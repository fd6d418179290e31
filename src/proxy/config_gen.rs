//! HAProxy configuration generation.
//!
//! Servers are added at runtime through the socket, so the generated
//! backends start empty; only the frontend bindings are static.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::config::schema::ClusterConfig;

/// Render the frontend/backend stanzas for the configured clusters.
///
/// The backend name equals the cluster name; the frontend gets a
/// `_frontend` suffix because HAProxy proxies share one namespace.
pub fn render_stanzas(clusters: &[ClusterConfig]) -> String {
    let mut out = String::new();
    for cluster in clusters {
        write!(
            out,
            "\n\nfrontend {name}_frontend\n    bind *:{port}\n    default_backend {name}\n\nbackend {name}\n    mode tcp\n",
            name = cluster.name,
            port = cluster.frontend_port,
        )
        .expect("writing to a String cannot fail");
    }
    out
}

/// Read the base template, append the cluster stanzas, and write the
/// runtime configuration file.
pub fn generate_config(
    template: &Path,
    output: &Path,
    clusters: &[ClusterConfig],
) -> io::Result<()> {
    let mut config = fs::read_to_string(template)?;
    config.push_str(&render_stanzas(clusters));
    fs::write(output, config)?;
    tracing::info!(path = %output.display(), "generated haproxy configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str, port: u16) -> ClusterConfig {
        ClusterConfig {
            name: name.to_string(),
            frontend_port: port,
        }
    }

    #[test]
    fn test_render_stanzas() {
        let rendered = render_stanzas(&[cluster("cache", 6379), cluster("sessions", 6380)]);

        assert!(rendered.contains("frontend cache_frontend"));
        assert!(rendered.contains("bind *:6379"));
        assert!(rendered.contains("default_backend cache"));
        assert!(rendered.contains("backend cache"));
        assert!(rendered.contains("frontend sessions_frontend"));
        assert!(rendered.contains("bind *:6380"));
        assert_eq!(rendered.matches("mode tcp").count(), 2);
    }

    #[test]
    fn test_generate_appends_to_template() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("haproxy.cfg");
        let output = dir.path().join("generated.cfg");
        std::fs::write(&template, "global\n    maxconn 256\n").unwrap();

        generate_config(&template, &output, &[cluster("cache", 6379)]).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.starts_with("global\n"));
        assert!(written.contains("frontend cache_frontend"));
    }
}
