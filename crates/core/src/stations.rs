use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A station the services track: a local alias plus the provider's PWS id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSpec {
    /// Name used as `station_id` in the database and the API
    pub alias: String,
    /// Provider station id, e.g. `KORMCMIN133`
    pub pws_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl StationSpec {
    pub fn new(alias: impl Into<String>, pws_id: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            pws_id: pws_id.into(),
            name: None,
        }
    }
}

/// Parses `alias=PWSID`, or a bare `PWSID` which then doubles as its own alias
impl FromStr for StationSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (alias, pws_id) = match s.split_once('=') {
            Some((alias, pws_id)) => (alias.trim(), pws_id.trim()),
            None => (s, s),
        };
        if alias.is_empty() || pws_id.is_empty() {
            return Err(format!("invalid station `{}`, expected alias=PWSID", s));
        }
        Ok(StationSpec::new(alias, pws_id))
    }
}

impl fmt::Display for StationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.alias, self.pws_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StationDirectory {
    stations: Vec<StationSpec>,
}

impl StationDirectory {
    pub fn new(stations: Vec<StationSpec>) -> Self {
        Self { stations }
    }

    /// Look a station up by alias or by provider id
    pub fn resolve(&self, id: &str) -> Option<&StationSpec> {
        self.stations
            .iter()
            .find(|s| s.alias == id)
            .or_else(|| self.stations.iter().find(|s| s.pws_id == id))
    }

    /// Alias stored in the database for `id`; unknown ids pass through untouched
    pub fn alias_for<'a>(&'a self, id: &'a str) -> &'a str {
        self.resolve(id).map(|s| s.alias.as_str()).unwrap_or(id)
    }

    /// Provider id to query for `id`; unknown ids pass through untouched
    pub fn pws_id_for<'a>(&'a self, id: &'a str) -> &'a str {
        self.resolve(id).map(|s| s.pws_id.as_str()).unwrap_or(id)
    }

    pub fn all(&self) -> &[StationSpec] {
        &self.stations
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StationDirectory {
        StationDirectory::new(vec![
            "propdada=KORMCMIN133".parse().unwrap(),
            "dustprop=KORMCMIN127".parse().unwrap(),
        ])
    }

    #[test]
    fn parses_alias_pairs_and_bare_ids() {
        let spec: StationSpec = "propdada = KORMCMIN133".parse().unwrap();
        assert_eq!(spec.alias, "propdada");
        assert_eq!(spec.pws_id, "KORMCMIN133");

        let bare: StationSpec = "KSLE".parse().unwrap();
        assert_eq!(bare.alias, "KSLE");
        assert_eq!(bare.pws_id, "KSLE");

        assert!("=KSLE".parse::<StationSpec>().is_err());
        assert!("".parse::<StationSpec>().is_err());
    }

    #[test]
    fn resolves_by_alias_or_provider_id() {
        let dir = directory();
        assert_eq!(dir.pws_id_for("propdada"), "KORMCMIN133");
        assert_eq!(dir.alias_for("KORMCMIN127"), "dustprop");
        assert_eq!(dir.alias_for("dustprop"), "dustprop");
        assert_eq!(dir.pws_id_for("KUNKNOWN1"), "KUNKNOWN1");
        assert!(dir.resolve("nope").is_none());
    }

    #[test]
    fn deserializes_from_toml_table() {
        #[derive(Deserialize)]
        struct Wrapper {
            stations: Vec<StationSpec>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [[stations]]
            alias = "propdada"
            pws_id = "KORMCMIN133"
            name = "McMinnville West"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.stations[0].name.as_deref(), Some("McMinnville West"));
    }
}
