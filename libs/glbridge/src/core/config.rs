// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::core::{BridgeError, Result};

fn default_input_stream() -> String {
    "input_video".into()
}

fn default_output_stream() -> String {
    "output_video".into()
}

fn default_probe_element() -> String {
    "flip".into()
}

fn default_sink_element() -> String {
    "glsink".into()
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

/// Configuration for a [`crate::session::BridgeSession`].
///
/// `graph_config` is the engine's own textual graph description and is
/// passed through opaquely; parsing it is the engine's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Engine graph description, passed to `ProcessingEngine::initialize`.
    pub graph_config: String,

    /// Engine input stream the interceptor submits wrapped buffers to.
    #[serde(default = "default_input_stream")]
    pub input_stream: String,

    /// Engine output stream the interceptor polls for results.
    #[serde(default = "default_output_stream")]
    pub output_stream: String,

    /// Named pipeline element whose source pad carries the probes.
    #[serde(default = "default_probe_element")]
    pub probe_element: String,

    /// Named sink element allocation queries are forwarded to.
    #[serde(default = "default_sink_element")]
    pub sink_element: String,

    /// Expected input video width in pixels.
    #[serde(default = "default_width")]
    pub input_width: u32,

    /// Expected input video height in pixels.
    #[serde(default = "default_height")]
    pub input_height: u32,
}

impl BridgeConfig {
    pub fn new(graph_config: impl Into<String>) -> Self {
        Self {
            graph_config: graph_config.into(),
            input_stream: default_input_stream(),
            output_stream: default_output_stream(),
            probe_element: default_probe_element(),
            sink_element: default_sink_element(),
            input_width: default_width(),
            input_height: default_height(),
        }
    }

    /// Parse from a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| BridgeError::Configuration(format!("bad session config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("input_stream", &self.input_stream),
            ("output_stream", &self.output_stream),
            ("probe_element", &self.probe_element),
            ("sink_element", &self.sink_element),
        ] {
            if value.is_empty() {
                return Err(BridgeError::Configuration(format!("{field} is empty")));
            }
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(BridgeError::Configuration(format!(
                "bad input dimensions {}x{}",
                self.input_width, self.input_height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config = BridgeConfig::from_toml_str(r#"graph_config = "node {}""#).unwrap();
        assert_eq!(config.input_stream, "input_video");
        assert_eq!(config.output_stream, "output_video");
        assert_eq!(config.input_width, 640);
        assert_eq!(config.input_height, 480);
    }

    #[test]
    fn test_rejects_empty_stream_name() {
        let err = BridgeConfig::from_toml_str(
            r#"
graph_config = "node {}"
input_stream = ""
"#,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_rejects_unknown_field() {
        assert!(BridgeConfig::from_toml_str(r#"graph = "typo""#).is_err());
    }
}
