//! Initialize workspace use case

use crate::error::{RetaggerError, Result};
use crate::infrastructure::config::CONFIG_FILE_NAME;
use crate::infrastructure::{Config, SubmissionStore};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

const CREDENTIALS_EXAMPLE: &str = r#"
# Uncomment the services you want to sync.
#
# [weasyl]
# user = "your-username"
# api_key = "your-api-key"
#
# [furaffinity]
# user = "your-username"
# cookie_a = "value of the 'a' cookie"
# cookie_b = "value of the 'b' cookie"
"#;

/// Initialize a retagger workspace at the specified path.
///
/// Writes a default `retagger.toml` and creates the submission database.
pub fn init(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }

    let config_path = path.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        return Err(RetaggerError::Config(format!(
            "{} already exists",
            config_path.display()
        )));
    }

    let config = Config::default();
    config.save_to(&config_path)?;
    OpenOptions::new()
        .append(true)
        .open(&config_path)?
        .write_all(CREDENTIALS_EXAMPLE.as_bytes())?;

    let database = path.join(&config.database);
    SubmissionStore::open(&database)?;

    println!("Initialized retagger workspace at {}", path.display());
    println!("Database: {}", database.display());

    Ok(())
}
