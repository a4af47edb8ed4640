use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the operational signer's private key.
/// Keys never live in the data directory.
pub const SIGNER_KEY_ENV: &str = "LEDGER_SIGNER_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DepartmentsFile {
    departments: Vec<Department>,
}

/// Synthesized when no department directory exists yet.
pub fn default_departments() -> Vec<Department> {
    [
        ("Water Supply", "+1234567890", "water@city.gov"),
        ("Electricity", "+1234567891", "power@city.gov"),
        ("Roads", "+1234567892", "roads@city.gov"),
        ("Sanitation", "+1234567893", "sanitation@city.gov"),
    ]
    .into_iter()
    .map(|(name, phone, email)| Department {
        name: name.into(),
        phone: phone.into(),
        email: email.into(),
    })
    .collect()
}

// ── Ledger ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Deployed registry contract. `None` leaves the client unbound.
    #[serde(default)]
    pub contract_address: Option<String>,
    /// Legacy gas price used for every submission.
    pub gas_price_gwei: u64,
    /// Fixed gas ceiling used when estimation fails.
    pub gas_limit: u64,
    /// Signer balance below this aborts a write before broadcast.
    pub min_balance_wei: u64,
    /// Multiplier applied over a successful gas estimate.
    pub fee_margin: f64,
    pub receipt_timeout_secs: u64,
    pub receipt_poll_ms: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Overrides the explorer derived from `rpc_url`.
    #[serde(default)]
    pub explorer_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".into(),
            contract_address: None,
            gas_price_gwei: 20,
            gas_limit: 3_000_000,
            min_balance_wei: 1_000_000_000_000_000, // 0.001 ETH
            fee_margin: 1.2,
            receipt_timeout_secs: 300,
            receipt_poll_ms: 2_000,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            explorer_url: None,
        }
    }
}

impl LedgerConfig {
    pub fn is_testnet(&self) -> bool {
        let url = self.rpc_url.to_lowercase();
        ["sepolia", "goerli", "mumbai"].iter().any(|n| url.contains(n))
    }

    pub fn explorer_url(&self) -> String {
        if let Some(url) = &self.explorer_url {
            return url.trim_end_matches('/').to_string();
        }
        let url = self.rpc_url.to_lowercase();
        if url.contains("sepolia") {
            "https://sepolia.etherscan.io".into()
        } else if url.contains("goerli") {
            "https://goerli.etherscan.io".into()
        } else {
            "https://etherscan.io".into()
        }
    }

    pub fn gas_price_wei(&self) -> u128 {
        u128::from(self.gas_price_gwei) * 1_000_000_000
    }
}

// ── Classifier ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Relative paths resolve against the data directory.
    pub model_path: PathBuf,
    /// Width of the hashed feature space for freshly created models.
    pub dimensions: usize,
    pub learning_rate: f32,
    pub l2_penalty: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("classifier/model.json"),
            dimensions: 4096,
            learning_rate: 0.5,
            l2_penalty: 0.0001,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub departments: Vec<Department>,
    pub ledger: LedgerConfig,
    pub classifier: ClassifierConfig,
    pub signer_key: Option<String>,
}

impl AppConfig {
    /// Load from the data/ directory.
    /// In tests, use AppConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let root = PathBuf::from(data_dir);

        let departments = load_or_create_departments(&root)?;

        let ledger_path = root.join("ledger/ledger_config.json");
        let ledger = if ledger_path.exists() {
            read_json::<LedgerConfig>(&ledger_path)?
        } else {
            log::warn!(
                "{} not found; using local defaults (no contract bound)",
                ledger_path.display()
            );
            LedgerConfig::default()
        };

        let classifier_path = root.join("classifier/classifier_config.json");
        let mut classifier = if classifier_path.exists() {
            read_json::<ClassifierConfig>(&classifier_path)?
        } else {
            ClassifierConfig::default()
        };
        if classifier.model_path.is_relative() {
            classifier.model_path = root.join(&classifier.model_path);
        }

        let signer_key = std::env::var(SIGNER_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            data_dir: root,
            departments,
            ledger,
            classifier,
            signer_key,
        })
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        let mut departments = default_departments();
        departments.push(Department {
            name: "General".into(),
            phone: "+1234567894".into(),
            email: "general@city.gov".into(),
        });
        Self {
            data_dir: std::env::temp_dir(),
            departments,
            ledger: LedgerConfig {
                contract_address: Some("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".into()),
                receipt_timeout_secs: 2,
                receipt_poll_ms: 1,
                ..LedgerConfig::default()
            },
            classifier: ClassifierConfig {
                dimensions: 1024,
                ..ClassifierConfig::default()
            },
            signer_key: None,
        }
    }

    pub fn department_names(&self) -> Vec<String> {
        self.departments.iter().map(|d| d.name.clone()).collect()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Cannot parse {}: {e}", path.display()))
}

/// Reads the department directory, synthesizing and persisting the
/// default set when the file is absent.
fn load_or_create_departments(root: &Path) -> anyhow::Result<Vec<Department>> {
    let path = root.join("departments/departments.json");
    if path.exists() {
        let file: DepartmentsFile = read_json(&path)?;
        if file.departments.is_empty() {
            anyhow::bail!("{} lists no departments", path.display());
        }
        return Ok(file.departments);
    }

    log::warn!("{} not found; creating default departments", path.display());
    let departments = default_departments();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = DepartmentsFile {
        departments: departments.clone(),
    };
    std::fs::write(&path, serde_json::to_string_pretty(&file)?)
        .map_err(|e| anyhow::anyhow!("Cannot write {}: {e}", path.display()))?;
    Ok(departments)
}
