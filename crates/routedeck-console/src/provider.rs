//! Route discovery providers.
//!
//! The discovery mechanism itself is external: a provider only has to hand
//! back the current route table. Both built-in providers read the JSON that
//! PowerShell's `ConvertTo-Json` produces for `Get-AdsRoute`.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use routedeck_core::{DeviceRecord, DiscoverySnapshot};

use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// Source of the route table.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// All routes currently known, including the local one.
    async fn list_routes(&self) -> Result<Vec<DeviceRecord>, ProviderError>;

    /// Net id of the machine running the console, if known.
    async fn local_net_id(&self) -> Result<Option<String>, ProviderError>;
}

#[async_trait]
impl<T: RouteProvider + ?Sized> RouteProvider for Box<T> {
    async fn list_routes(&self) -> Result<Vec<DeviceRecord>, ProviderError> {
        (**self).list_routes().await
    }

    async fn local_net_id(&self) -> Result<Option<String>, ProviderError> {
        (**self).local_net_id().await
    }
}

/// Query the provider and build a display snapshot.
pub async fn poll_snapshot<P: RouteProvider + ?Sized>(
    provider: &P,
) -> Result<DiscoverySnapshot, ProviderError> {
    let routes = provider.list_routes().await?;
    let local = provider.local_net_id().await?;
    let total = routes.len();
    let snapshot = DiscoverySnapshot::from_routes(routes, local.as_deref());
    tracing::debug!(routes = total, shown = snapshot.len(), "Polled route table");
    Ok(snapshot)
}

/// Build the provider selected by the configuration.
pub fn from_config(config: &ProviderConfig) -> Box<dyn RouteProvider> {
    match &config.routes_file {
        Some(path) => Box::new(FileRouteProvider::new(path.clone(), config.local_net_id.clone())),
        None => Box::new(CommandRouteProvider::new(
            &config.command,
            config.args.clone(),
            config.local_net_id.clone(),
        )),
    }
}

/// Parse provider JSON output.
///
/// `ConvertTo-Json` emits nothing for an empty table and a bare object for a
/// single route, so both are accepted alongside a plain array. A record that
/// does not parse is skipped so the rest of the table still shows.
pub fn parse_routes(bytes: &[u8]) -> Result<Vec<DeviceRecord>, ProviderError> {
    // PowerShell on Windows may prefix a UTF-8 BOM.
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value::<DeviceRecord>(item) {
                Ok(route) => Some(route),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping unreadable route record");
                    None
                }
            })
            .collect()),
        other => Ok(vec![serde_json::from_value::<DeviceRecord>(other)?]),
    }
}

fn local_from_routes(routes: &[DeviceRecord]) -> Option<String> {
    routes.iter().find(|r| r.is_local).map(|r| r.net_id.clone())
}

// ── Command provider ──────────────────────────────────────────────

/// Runs a program that prints the route table as JSON on stdout.
pub struct CommandRouteProvider {
    program: String,
    args: Vec<String>,
    local_net_id: Option<String>,
}

impl CommandRouteProvider {
    pub fn new(program: &str, args: Vec<String>, local_net_id: Option<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            local_net_id,
        }
    }

    async fn run(&self) -> Result<Vec<DeviceRecord>, ProviderError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProviderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProviderError::CommandFailed {
                program: self.program.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_routes(&output.stdout)
    }
}

#[async_trait]
impl RouteProvider for CommandRouteProvider {
    async fn list_routes(&self) -> Result<Vec<DeviceRecord>, ProviderError> {
        self.run().await
    }

    async fn local_net_id(&self) -> Result<Option<String>, ProviderError> {
        Ok(self.local_net_id.clone())
    }
}

// ── File provider ─────────────────────────────────────────────────

/// Re-reads a JSON route file on every poll.
pub struct FileRouteProvider {
    path: PathBuf,
    local_net_id: Option<String>,
}

impl FileRouteProvider {
    pub fn new(path: PathBuf, local_net_id: Option<String>) -> Self {
        Self { path, local_net_id }
    }
}

#[async_trait]
impl RouteProvider for FileRouteProvider {
    async fn list_routes(&self) -> Result<Vec<DeviceRecord>, ProviderError> {
        let bytes = tokio::fs::read(&self.path).await?;
        parse_routes(&bytes)
    }

    async fn local_net_id(&self) -> Result<Option<String>, ProviderError> {
        if self.local_net_id.is_some() {
            return Ok(self.local_net_id.clone());
        }
        Ok(local_from_routes(&self.list_routes().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array() {
        let json = br#"[{"Name":"B","Address":"10.0.0.2","NetId":"5.2.2.2.1.1","RTSystem":"Win10","IsLocal":false},
                        {"Name":"A","Address":"10.0.0.1","NetId":"5.1.1.1.1.1","RTSystem":"TcBSD","IsLocal":false}]"#;
        let routes = parse_routes(json).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].name, "B");
    }

    #[test]
    fn parses_single_object() {
        let json = br#"{"Name":"A","Address":"10.0.0.1","NetId":"5.1.1.1.1.1","RTSystem":"TcBSD","IsLocal":false}"#;
        let routes = parse_routes(json).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].os_tag, "TcBSD");
    }

    #[test]
    fn parses_empty_output_and_bom() {
        assert!(parse_routes(b"  \r\n").unwrap().is_empty());
        let json = b"\xEF\xBB\xBF[]";
        assert!(parse_routes(json).unwrap().is_empty());
    }

    #[test]
    fn null_properties_keep_the_route_listed() {
        let json = br#"[{"Name":"A","Address":"10.0.0.1","NetId":"5.1.1.1.1.1","RTSystem":"Win10","IsLocal":false},
                        {"Name":"B","Address":null,"NetId":"5.2.2.2.1.1","RTSystem":null,"IsLocal":false}]"#;
        let routes = parse_routes(json).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].name, "B");
        assert_eq!(routes[1].address, "");
        assert_eq!(routes[1].os_tag, "");
    }

    #[test]
    fn unreadable_record_is_skipped() {
        let json = br#"[{"Name":"A","Address":"10.0.0.1","NetId":"5.1.1.1.1.1","RTSystem":"Win10"},
                        {"Address":"10.0.0.2"},
                        42]"#;
        let routes = parse_routes(json).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "A");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_routes(b"Get-AdsRoute : not recognized"),
            Err(ProviderError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn file_provider_filters_local_route() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(
            &path,
            r#"[{"Name":"Zeta","Address":"10.0.0.9","NetId":"5.9.9.9.1.1","RTSystem":"Win10","IsLocal":false},
                {"Name":"Self","Address":"127.0.0.1","NetId":"1.2.3.4.1.1","RTSystem":"Win11","IsLocal":true},
                {"Name":"Alpha","Address":"10.0.0.1","NetId":"5.1.1.1.1.1","RTSystem":"TcBSD","IsLocal":false}]"#,
        )
        .unwrap();

        let provider = FileRouteProvider::new(path, None);
        assert_eq!(
            provider.local_net_id().await.unwrap().as_deref(),
            Some("1.2.3.4.1.1")
        );
        let snapshot = poll_snapshot(&provider).await.unwrap();
        let names: Vec<&str> = snapshot.devices().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[tokio::test]
    async fn file_provider_missing_file_is_an_error() {
        let provider = FileRouteProvider::new(PathBuf::from("/nonexistent/routes.json"), None);
        assert!(matches!(
            poll_snapshot(&provider).await,
            Err(ProviderError::Io(_))
        ));
    }

    #[tokio::test]
    async fn command_provider_reports_missing_program() {
        let provider = CommandRouteProvider::new("routedeck-no-such-program", vec![], None);
        assert!(matches!(
            provider.list_routes().await,
            Err(ProviderError::Spawn { .. })
        ));
    }
}
