//! C16: configuration consumer. A plain struct, not a text-format parser —
//! the textual format is out of scope, same as Section 6 describes. Defaults
//! and clamping mirror "parser errors fall back to defaults and log a
//! warning; the module must not abort the process": [`CoreConfig::validate`]
//! clamps in place and reports which keys it touched instead of failing.

use std::path::PathBuf;

pub struct CoreConfig {
    // LP (neighbor layer)
    pub min_connections: usize,
    pub max_connections: usize,
    pub cache_size: usize,
    pub expiration_ticks: u32,
    pub static_nodes_file: PathBuf,
    pub recent_nodes_file: PathBuf,
    pub lp_cipher_list: String,
    pub lp_hash_list: String,
    pub lp_mac_list: String,

    // NP (overlay layer)
    pub key_store_size: usize,
    pub public_key_file: PathBuf,
    pub private_key_file: PathBuf,
    pub np_cipher_list: String,
    pub np_hash_list: String,
    pub np_mac_list: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let link = kurupira_link::LinkConfig::default();
        let net = kurupira_net::NetConfig::default();
        Self {
            min_connections: link.min_connections,
            max_connections: link.max_connections,
            cache_size: link.cache_size,
            expiration_ticks: link.expiration_ticks,
            static_nodes_file: link.static_nodes_file,
            recent_nodes_file: link.recent_nodes_file,
            lp_cipher_list: link.algorithm_lists.cipher_list,
            lp_hash_list: link.algorithm_lists.hash_list,
            lp_mac_list: link.algorithm_lists.mac_list,

            key_store_size: net.key_store_size,
            public_key_file: net.public_key_file,
            private_key_file: net.private_key_file,
            np_cipher_list: net.algorithm_lists.cipher_list,
            np_hash_list: net.algorithm_lists.hash_list,
            np_mac_list: net.algorithm_lists.mac_list,
        }
    }
}

impl CoreConfig {
    /// Clamps obviously-bad values in place and returns the names of any
    /// fields that were overwritten with their default, so a caller can log
    /// a warning instead of the process aborting on a bad config file.
    pub fn validate(&mut self) -> Vec<&'static str> {
        let defaults = Self::default();
        let mut defaulted = Vec::new();

        if self.max_connections == 0 {
            self.max_connections = defaults.max_connections;
            defaulted.push("max_connections");
        }
        if self.min_connections > self.max_connections {
            self.min_connections = self.max_connections;
            defaulted.push("min_connections");
        }
        if self.cache_size == 0 {
            self.cache_size = defaults.cache_size;
            defaulted.push("cache_size");
        }
        if self.expiration_ticks == 0 {
            self.expiration_ticks = defaults.expiration_ticks;
            defaulted.push("expiration_ticks");
        }
        if self.key_store_size == 0 {
            self.key_store_size = defaults.key_store_size;
            defaulted.push("key_store_size");
        }
        if self.lp_cipher_list.is_empty() || self.lp_hash_list.is_empty() || self.lp_mac_list.is_empty() {
            self.lp_cipher_list = defaults.lp_cipher_list;
            self.lp_hash_list = defaults.lp_hash_list;
            self.lp_mac_list = defaults.lp_mac_list;
            defaulted.push("lp_algorithm_lists");
        }
        if self.np_cipher_list.is_empty() || self.np_hash_list.is_empty() || self.np_mac_list.is_empty() {
            self.np_cipher_list = defaults.np_cipher_list;
            self.np_hash_list = defaults.np_hash_list;
            self.np_mac_list = defaults.np_mac_list;
            defaulted.push("np_algorithm_lists");
        }

        defaulted
    }

    pub fn link_config(&self) -> kurupira_link::LinkConfig {
        kurupira_link::LinkConfig {
            min_connections: self.min_connections,
            max_connections: self.max_connections,
            cache_size: self.cache_size,
            expiration_ticks: self.expiration_ticks,
            static_nodes_file: self.static_nodes_file.clone(),
            recent_nodes_file: self.recent_nodes_file.clone(),
            algorithm_lists: kurupira_link::AlgorithmLists { cipher_list: self.lp_cipher_list.clone(), hash_list: self.lp_hash_list.clone(), mac_list: self.lp_mac_list.clone() },
        }
    }

    pub fn net_config(&self) -> kurupira_net::NetConfig {
        kurupira_net::NetConfig {
            key_store_size: self.key_store_size,
            public_key_file: self.public_key_file.clone(),
            private_key_file: self.private_key_file.clone(),
            algorithm_lists: kurupira_net::NpAlgorithmLists { cipher_list: self.np_cipher_list.clone(), hash_list: self.np_hash_list.clone(), mac_list: self.np_mac_list.clone() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_clean() {
        let mut config = CoreConfig::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn zeroed_capacities_are_defaulted_and_reported() {
        let mut config = CoreConfig::default();
        config.max_connections = 0;
        config.key_store_size = 0;
        let defaulted = config.validate();
        assert!(defaulted.contains(&"max_connections"));
        assert!(defaulted.contains(&"key_store_size"));
        assert!(config.max_connections > 0);
        assert!(config.key_store_size > 0);
    }

    #[test]
    fn inverted_connection_bounds_are_clamped() {
        let mut config = CoreConfig::default();
        config.max_connections = 5;
        config.min_connections = 50;
        config.validate();
        assert_eq!(config.min_connections, 5);
    }
}
