use serde::Deserialize;

#[derive(Clone, Default, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum OptionsStoreConfig {
    #[default]
    Memory,
    Filesystem { path: String },
}
