use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_RESOURCES: &str = "cpus:1;mem:1024";

/// Environment variable that overrides the advertised public hostname.
/// Useful on cloud hosts where the local hostname is not routable.
pub const PUBLIC_DNS_ENV: &str = "DROVER_PUBLIC_DNS";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address the agent's message endpoint listens on.
    pub listen_addr: SocketAddr,
    /// Address of the read-only introspection HTTP server, if enabled.
    pub http_addr: Option<SocketAddr>,
    /// Statically configured master endpoint handed to the detector.
    pub master: Option<String>,
    /// Total consumable resources, `name:value` pairs separated by `;`.
    pub resources: String,
    /// Attributes of this machine, `name:value` pairs separated by `;`.
    pub attributes: String,
    /// Where to place framework work directories.
    pub work_dir: PathBuf,
    /// Where to find Hadoop installed, for fetching executors from HDFS.
    pub hadoop_home: Option<String>,
    /// Whether to run tasks as the user who submitted them.
    pub switch_user: bool,
    /// Directory prepended to relative executor URIs.
    pub frameworks_home: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            listen_addr: "127.0.0.1:5051".parse().unwrap(),
            http_addr: None,
            master: None,
            resources: DEFAULT_RESOURCES.to_string(),
            attributes: String::new(),
            work_dir: PathBuf::from(home).join("work"),
            hadoop_home: None,
            switch_user: true,
            frameworks_home: None,
        }
    }
}

impl AgentConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_resources(mut self, resources: &str) -> Self {
        self.resources = resources.to_string();
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_master(mut self, master: &str) -> Self {
        self.master = Some(master.to_string());
        self
    }

    /// Machine attributes parsed into a map; entries without a `:` are skipped.
    pub fn attributes_map(&self) -> BTreeMap<String, String> {
        self.attributes
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once(':')?;
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }

    /// Key/value dump of the configuration for the `/slave/vars` endpoint.
    pub fn vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("listen_addr".to_string(), self.listen_addr.to_string()),
            ("resources".to_string(), self.resources.clone()),
            ("attributes".to_string(), self.attributes.clone()),
            (
                "work_dir".to_string(),
                self.work_dir.to_string_lossy().to_string(),
            ),
            ("switch_user".to_string(), self.switch_user.to_string()),
        ];
        if let Some(addr) = &self.http_addr {
            vars.push(("http_addr".to_string(), addr.to_string()));
        }
        if let Some(master) = &self.master {
            vars.push(("master".to_string(), master.clone()));
        }
        if let Some(hadoop_home) = &self.hadoop_home {
            vars.push(("hadoop_home".to_string(), hadoop_home.clone()));
        }
        if let Some(frameworks_home) = &self.frameworks_home {
            vars.push((
                "frameworks_home".to_string(),
                frameworks_home.to_string_lossy().to_string(),
            ));
        }
        vars
    }
}
