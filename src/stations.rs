/// Server and station registry for the monitoring service.
///
/// Built once from `wxmon.toml` and read-only afterwards. This is the single
/// source of truth for which servers are polled and which station indices
/// each of them is asked about; other modules should look stations up here
/// rather than reading the configuration themselves.

use std::cmp::Ordering;

use crate::config::WxConfig;
use crate::model::{Server, Station};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable view of all configured servers and their stations.
#[derive(Debug, Clone)]
pub struct StationRegistry {
    servers: Vec<Server>,
    /// Stations in configuration order, grouped by server.
    stations: Vec<Station>,
}

impl StationRegistry {
    /// Builds the registry from a validated configuration.
    pub fn from_config(config: &WxConfig) -> Self {
        let mut servers = Vec::with_capacity(config.servers.len());
        let mut stations = Vec::new();

        for server in &config.servers {
            servers.push(Server {
                name: server.name.clone(),
                base_url: server.url.trim_end_matches('/').to_string(),
            });
            for station in &server.stations {
                stations.push(Station {
                    server: server.name.clone(),
                    index: station.index.clone(),
                    display_name: station.name.clone(),
                });
            }
        }

        Self { servers, stations }
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    /// All stations in configuration order.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn find_server(&self, name: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Stations of one server, in configuration order.
    pub fn stations_for<'a>(&'a self, server: &'a str) -> impl Iterator<Item = &'a Station> + 'a {
        self.stations.iter().filter(move |s| s.server == server)
    }

    /// Station indices of one server, in configuration order, suitable for
    /// the `stations` list parameter.
    pub fn station_indices_for(&self, server: &str) -> Vec<String> {
        self.stations_for(server).map(|s| s.index.clone()).collect()
    }

    /// Looks up a station by index across all servers. When the same index
    /// is configured on several servers, the last one wins.
    pub fn find_station(&self, index: &str) -> Option<&Station> {
        self.stations.iter().rev().find(|s| s.index == index)
    }

    pub fn display_name(&self, index: &str) -> Option<&str> {
        self.find_station(index).map(|s| s.display_name.as_str())
    }

    /// Distinct station indices across all servers, ordered for display
    /// (numeric value of the index first, then text).
    pub fn sorted_station_indices(&self) -> Vec<String> {
        let mut indices: Vec<String> = self.stations.iter().map(|s| s.index.clone()).collect();
        indices.sort_by(|a, b| compare_indices(a, b));
        indices.dedup();
        indices
    }

    pub fn station_count(&self) -> usize {
        self.sorted_station_indices().len()
    }
}

/// Orders station indices by their numeric value; indices that are not
/// numbers sort after all numeric ones, by text.
pub fn compare_indices(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, parse_config, DEFAULT_CONFIG_PATH};

    fn two_server_registry() -> StationRegistry {
        let config = parse_config(
            r#"
            [[server]]
            name = "central"
            url = "http://central.example/api/"
            [[server.station]]
            index = "100"
            name = "Hundred"
            [[server.station]]
            index = "9"
            name = "Nine"

            [[server]]
            name = "west"
            url = "http://west.example/api"
            [[server.station]]
            index = "20"
            name = "Twenty"
            [[server.station]]
            index = "9"
            name = "Nine (west)"
            "#,
        )
        .expect("test config should parse");
        StationRegistry::from_config(&config)
    }

    #[test]
    fn test_bundled_registry_has_no_duplicate_indices_per_server() {
        let registry = StationRegistry::from_config(
            &load_config(DEFAULT_CONFIG_PATH).expect("bundled config should load"),
        );
        for server in registry.servers() {
            let mut seen = std::collections::HashSet::new();
            for station in registry.stations_for(&server.name) {
                assert!(
                    seen.insert(station.index.clone()),
                    "duplicate station '{}' on server '{}'",
                    station.index,
                    server.name
                );
            }
        }
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let registry = two_server_registry();
        let central = registry.find_server("central").expect("central should exist");
        assert_eq!(central.base_url, "http://central.example/api");
    }

    #[test]
    fn test_station_indices_keep_configuration_order() {
        let registry = two_server_registry();
        assert_eq!(registry.station_indices_for("central"), vec!["100", "9"]);
        assert_eq!(registry.station_indices_for("west"), vec!["20", "9"]);
        assert!(registry.station_indices_for("nowhere").is_empty());
    }

    #[test]
    fn test_sorted_indices_are_numeric_and_distinct() {
        let registry = two_server_registry();
        assert_eq!(registry.sorted_station_indices(), vec!["9", "20", "100"]);
        assert_eq!(registry.station_count(), 3);
    }

    #[test]
    fn test_shared_index_resolves_to_last_server() {
        let registry = two_server_registry();
        assert_eq!(registry.display_name("9"), Some("Nine (west)"));
        assert_eq!(registry.find_station("9").map(|s| s.server.as_str()), Some("west"));
    }

    #[test]
    fn test_find_station_returns_none_for_unknown_index() {
        assert!(two_server_registry().find_station("00000").is_none());
    }

    #[test]
    fn test_non_numeric_indices_sort_last() {
        let mut indices = vec!["b", "10", "a", "2"];
        indices.sort_by(|a, b| compare_indices(a, b));
        assert_eq!(indices, vec!["2", "10", "a", "b"]);
    }
}
