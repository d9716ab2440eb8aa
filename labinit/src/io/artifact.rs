//! Static provisioning files for the monitoring stack.
//!
//! These are regenerated on every run: the content below is the source of
//! truth and any prior file content is replaced.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::LabError;
use crate::io::resolver::LabPaths;

/// Grafana data source pointing at the Zabbix API through the server-side proxy.
pub const DATASOURCE_YAML: &str = "\
apiVersion: 1

datasources:
  - name: Zabbix
    type: alexanderzobnin-zabbix-datasource
    access: proxy
    url: http://zabbix-web:8080/api_jsonrpc.php
    isDefault: true
    jsonData:
      username: Admin
      trends: true
      trendsFrom: 7d
      trendsRange: 4d
    secureJsonData:
      password: zabbix
    editable: true
";

/// Grafana app plugin entry enabling the Zabbix app.
pub const PLUGIN_YAML: &str = "\
apiVersion: 1

apps:
  - type: alexanderzobnin-zabbix-app
    org_id: 1
    disabled: false
";

/// A file and the exact bytes it must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub content: &'static str,
}

/// The monitoring provisioning files for a lab.
pub fn monitoring_artifacts(paths: &LabPaths) -> Vec<Artifact> {
    vec![
        Artifact {
            path: paths.datasource_file.clone(),
            content: DATASOURCE_YAML,
        },
        Artifact {
            path: paths.plugin_file.clone(),
            content: PLUGIN_YAML,
        },
    ]
}

/// Write `content` to `path` verbatim, creating parent directories and
/// truncating any existing file.
pub fn write_artifact(path: &Path, content: &str) -> Result<(), LabError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| LabError::io(format!("create directory {}", parent.display()), e))?;
    }
    fs::write(path, content).map_err(|e| LabError::io(format!("write {}", path.display()), e))?;
    debug!(path = %path.display(), bytes = content.len(), "artifact written");
    Ok(())
}
