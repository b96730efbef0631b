use crate::storage::{self, StorageManager};
use anyhow::Context;
use serde::{Deserialize, Serialize};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Address the daemon binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Backfill missing titles/icons in the background after an optimistic
    /// save instead of blocking the save on resolution.
    #[serde(default = "default_background_refresh")]
    pub background_refresh: bool,

    #[serde(skip_serializing, skip_deserializing)]
    pub(crate) base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            background_refresh: default_background_refresh(),
            base_path: String::new(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_background_refresh() -> bool {
    true
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        self.listen_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("listen_addr is not a valid socket address: {}", self.listen_addr))?;
        Ok(())
    }

    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists("config.yaml") {
            store.write(
                "config.yaml",
                serde_yml::to_string(&Self::default())
                    .context("serializing default config")?
                    .as_bytes(),
            )?;
        }

        let config_str =
            String::from_utf8(store.read("config.yaml")?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_string();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write("config.yaml", config_str.as_bytes())?;
        Ok(())
    }
}
