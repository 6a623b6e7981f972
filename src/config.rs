use std::path::Path;

use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;
use tracing::info;

/// Static lookup tables driving classification, extraction and the sink
/// field mapping. Built once at start-up and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    /// Declaration order is significant: the first contained phrase wins.
    pub associations: Vec<AssociationPhrase>,
    pub listing: ListingConfig,
    pub directory: DirectoryConfig,
    pub fields: FieldMap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationPhrase {
    pub phrase: String,
    pub code: String,
}

/// Settings for the association whose directory spreads each entry over
/// several lines (name / street / city-state-zip / marker).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub association: String,
    pub profile_base: String,
    pub counties: Vec<CountyDir>,
    pub default_county: String,
    pub finalize_marker: String,
    pub country_markers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountyDir {
    pub phrase: String,
    pub dir: String,
}

/// Settings for the email-anchored, one-entry-per-line directories.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub min_line_len: usize,
    pub noise_prefixes: Vec<String>,
}

/// Numeric field ids of the target table. Owned by the remote schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub association: u32,
    pub property: u32,
    pub member_type: u32,
    pub full_address: u32,
    pub city: u32,
    pub state: u32,
    pub zip: u32,
    pub phone: u32,
    pub email: u32,
    pub company: u32,
    pub units: u32,
}

const ASSOCIATIONS: &[(&str, &str)] = &[
    // Apartment associations
    ("APARTMENT ASSOCIATION OF GREATER ORLANDO", "AAGO"),
    ("FIRST COAST AA", "FCAA"),
    ("FIRST COAST APARTMENT ASSOCIATION", "FCAA"),
    ("CAPITAL CITY AA", "CCAA"),
    ("NORTHWEST FLORIDA APARTMENT ASSOC", "NWFAA"),
    ("MOBILE BAY AREA APARTMENT ASSOC", "MBAAA"),
    ("GREATER GULF COAST APARTMENT ASSOCIATION", "GGCAA"),
    ("BATON ROUGE APARTMENT ASSOCIATION", "BRAA"),
    ("SHREVEPORT/BOSSIER AA", "SBAA"),
    ("ACADIANA APARTMENT ASSOCATION", "AAA"),
    ("HOUSTON APARTMENT ASSOCIATION", "HAA"),
    ("APARTMENT ASSOCIATION OF GREATER MEMPHIS", "AAGM"),
    ("GREATER NASHVILLE APARTMENT ASSOCIATION", "GNAA"),
    ("UPPER STATE APARTMENT ASSOC", "USAA"),
    ("GREATER COLUMBUS APARTMENT ASSOCIATION", "GCAA"),
    // IFMA
    ("GREATER ORLANDO CHAPTER OF IFMA", "IFMA-ORL"),
    ("IFMA - JACKSONVILLE", "IFMA-JAX"),
    ("SUNCOAST CHAPTER", "IFMA-SC"),
    ("CENTRAL AL AND GULF COAST CHAPTER OF IFMA", "IFMA-ALGC"),
    ("NEW ORLEANS CHAPTER OF IFMA", "IFMA-NO"),
    ("BATON ROUGE CHAPTER OF IFMA", "IFMA-BR"),
    ("MEMPHIS CHAPTER OF IFMA", "IFMA-MEM"),
    ("NASHVILLE CHAPTER OF IFMA", "IFMA-NSH"),
    // CAI
    ("CAI NORTHEAST FLORIDA", "CAI-NEFL"),
    ("NORTH GULF COAST CHAPTER", "CAI-NGC"),
    ("LOUSIANA CHAPTER", "CAI-LA"),
    ("TENNESSEE CHAPTER", "CAI-TN"),
    // BOMA
    ("HOUSTON BOMA", "BOMA-HOU"),
    ("BOMA HOUSTON", "BOMA-HOU"),
    ("BOMA NASHVILLE", "BOMA-NSH"),
    // APPA
    ("TAPPA", "TAPPA"),
    ("MSAPPA", "MSAPPA"),
    ("FLAPPA", "FLAPPA"),
    // TNLA
    ("TNLA", "TNLA"),
];

const COUNTIES: &[(&str, &str)] = &[
    ("OSCEOLA COUNTY", "OsceolaCounty"),
    ("ORANGE COUNTY", "OrangeCounty"),
    ("SEMINOLE COUNTY", "SeminoleCounty"),
    ("LAKE COUNTY", "LakeCounty"),
    ("VOLUSIA COUNTY", "VolusiaCounty"),
];

const NOISE_PREFIXES: &[&str] = &[
    "cookie",
    "skip to",
    "want to find",
    "search for",
    "company name",
    "units greater",
    "company\tfull",
    "company full",
    "to view complete",
];

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            associations: ASSOCIATIONS
                .iter()
                .map(|(phrase, code)| AssociationPhrase {
                    phrase: phrase.to_string(),
                    code: code.to_string(),
                })
                .collect(),
            listing: ListingConfig::default(),
            directory: DirectoryConfig::default(),
            fields: FieldMap::default(),
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            association: "AAGO".into(),
            profile_base: "https://www.aago.org".into(),
            counties: COUNTIES
                .iter()
                .map(|(phrase, dir)| CountyDir {
                    phrase: phrase.to_string(),
                    dir: dir.to_string(),
                })
                .collect(),
            default_county: "OsceolaCounty".into(),
            finalize_marker: "Apartment Community".into(),
            country_markers: vec![
                "United States".into(),
                "United States of America".into(),
                "USA".into(),
                "US".into(),
            ],
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            min_line_len: 10,
            noise_prefixes: NOISE_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            association: 6,
            property: 7,
            member_type: 8,
            full_address: 9,
            city: 10,
            state: 11,
            zip: 12,
            phone: 14,
            email: 15,
            company: 18,
            units: 22,
        }
    }
}

impl Lexicon {
    /// Built-in tables, or the contents of a TOML file when one is given.
    /// Tables missing from the file keep their built-in values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let lexicon: Lexicon = Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("Failed to read lexicon {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("Invalid lexicon {}", path.display()))?;

        info!(
            "Loaded lexicon from {} ({} association phrases, {} counties)",
            path.display(),
            lexicon.associations.len(),
            lexicon.listing.counties.len()
        );
        Ok(lexicon)
    }
}

/// Credentials for the hosted table, read from `QB_REALM`, `QB_TABLE_ID`
/// and `QB_USER_TOKEN`.
#[derive(Clone, Deserialize)]
pub struct QuickbaseSettings {
    pub realm: String,
    pub table_id: String,
    pub user_token: String,
}

impl QuickbaseSettings {
    pub fn from_env() -> Result<Self> {
        Config::builder()
            .add_source(config::Environment::with_prefix("QB"))
            .build()
            .context("Failed to read QB_* environment")?
            .try_deserialize()
            .context("QB_REALM, QB_TABLE_ID and QB_USER_TOKEN must be set")
    }
}
