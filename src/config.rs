use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Configuration for a converse instance.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// URL to connect to the database
    pub database_url: String,
    /// How many threads are listed per board page.
    pub threads_per_page: u32,
    /// How many posts are shown per thread page.
    pub posts_per_page: u32,
    /// How many posts are shown per page of a user's post history.
    pub history_per_page: u32,
    /// How many results are shown per search page.
    pub search_per_page: u32,
    /// File to log to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Open a config file at the given path.
    pub fn open<P>(path: P) -> Result<Config>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let msg = format!("Couldn't open config file at {}", path.display());

        let reader =
            File::open(path).map_err(|err| Error::from_io_error(err, msg))?;

        Ok(serde_yaml::from_reader(reader)?)
    }

    /// Generate a new config file from default values.
    pub fn generate<W>(mut out: W) -> Result<()>
    where
        W: std::io::Write,
    {
        writeln!(&mut out, "# Configuration for converse")?;
        serde_yaml::to_writer(&mut out, &Config::default())?;
        writeln!(&mut out)?;
        Ok(())
    }

    /// Get the default location of the config file.
    pub fn default_path() -> PathBuf {
        if cfg!(debug_assertions) {
            PathBuf::from("contrib/dev-config.yaml")
        } else {
            PathBuf::from("/etc/converse/config.yaml")
        }
    }

    /// Dump configuration info to the log.
    pub fn debug_log(&self) {
        use log::debug;

        debug!("  database url {}", self.database_url);
        debug!("  threads per page {}", self.threads_per_page);
        debug!("  posts per page {}", self.posts_per_page);
        debug!("  history per page {}", self.history_per_page);
        debug!("  search results per page {}", self.search_per_page);
        if let Some(ref log_file) = self.log_file {
            debug!("  log file {}", log_file.display());
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        if cfg!(debug_assertions) {
            Config {
                database_url: "postgres://converse:@localhost/converse"
                    .into(),
                threads_per_page: 20,
                posts_per_page: 15,
                history_per_page: 10,
                search_per_page: 20,
                log_file: None,
            }
        } else {
            Config {
                database_url: "postgres://converse:@localhost/converse"
                    .into(),
                threads_per_page: 20,
                posts_per_page: 15,
                history_per_page: 10,
                search_per_page: 20,
                log_file: Some(PathBuf::from("/var/log/converse/converse.log")),
            }
        }
    }
}
