use crate::error::{CliError, Result};
use alchemd::core::manifold::ManifoldKind;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileManifoldConfig {
    pub kind: Option<ManifoldKind>,
    pub n: Option<[i32; 3]>,
    pub box_lengths: Option<[f64; 3]>,
    pub epsilon: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileProjectionConfig {
    pub constraint_tolerance: Option<f64>,
    pub max_projection_iterations: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileAlchemostatConfig {
    pub period: Option<u64>,
    pub dt: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileUpdaterConfig {
    pub temperature: Option<f64>,
    pub move_size_scale: Option<f64>,
    pub target_acceptance_ratio: Option<f64>,
    pub tune_interval: Option<u64>,
    pub max_scale_adjustment: Option<f64>,
    pub min_move_size: Option<f64>,
    pub max_move_size: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileDof {
    /// `particle:<tag>` or `type:<name>`.
    pub target: String,
    pub parameter: String,
    pub value: f64,
    pub momentum: Option<f64>,
    pub mass: Option<f64>,
    pub period: Option<u64>,
    pub stiffness: Option<f64>,
    pub center: Option<f64>,
    #[serde(default)]
    pub integrate: bool,
    #[serde(default)]
    pub breathing: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum FileMoveKind {
    RandomWalk {
        min: Option<f64>,
        max: Option<f64>,
        #[serde(rename = "move-probability")]
        move_probability: Option<f64>,
    },
    Delta {
        values: Vec<f64>,
    },
    Target {
        values: Vec<f64>,
    },
    Elastic {
        stiffness: f64,
        reference: Vec<f64>,
        #[serde(rename = "move-probability")]
        move_probability: Option<f64>,
    },
    Vertex {
        volume: f64,
        #[serde(rename = "move-probability")]
        move_probability: Option<f64>,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FileMove {
    pub name: String,
    /// `<target>/<parameter>` references, e.g. `type:A/diameter`.
    pub dofs: Vec<String>,
    pub initial_scale: Option<f64>,
    #[serde(flatten)]
    pub kind: FileMoveKind,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub seed: Option<u64>,
    pub steps: Option<u64>,
    pub trial_interval: Option<u64>,
    pub tether: Option<f64>,
    pub positions: Option<Vec<[f64; 3]>>,
    pub manifold: Option<FileManifoldConfig>,
    pub projection: Option<FileProjectionConfig>,
    pub alchemostat: Option<FileAlchemostatConfig>,
    pub updater: Option<FileUpdaterConfig>,
    #[serde(default)]
    pub dofs: Vec<FileDof>,
    #[serde(default)]
    pub moves: Vec<FileMove>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn full_file_deserializes() {
        let content = r#"
            seed = 9
            steps = 200
            trial-interval = 5
            tether = 0.5
            positions = [[0.0, 0.0, 0.0], [3.14, 3.14, 3.14]]

            [manifold]
            kind = "gyroid"
            n = [1, 1, 1]
            box-lengths = [6.283, 6.283, 6.283]

            [alchemostat]
            period = 4
            dt = 0.005

            [updater]
            temperature = 1.0
            target-acceptance-ratio = 0.4

            [[dofs]]
            target = "type:A"
            parameter = "diameter"
            value = 1.0
            mass = 2.0
            integrate = true

            [[moves]]
            name = "walk"
            kind = "random-walk"
            dofs = ["type:A/diameter"]
            max = 3.0

            [[moves]]
            name = "squash"
            kind = "elastic"
            dofs = ["type:A/diameter"]
            stiffness = 1.5
            reference = [1.0]
        "#;
        let config: FileConfig = toml::from_str(content).unwrap();
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.positions.as_ref().map(Vec::len), Some(2));
        assert_eq!(
            config.manifold.as_ref().and_then(|m| m.kind),
            Some(ManifoldKind::Gyroid)
        );
        assert_eq!(config.dofs.len(), 1);
        assert!(config.dofs[0].integrate);
        assert_eq!(
            config.moves[0].kind,
            FileMoveKind::RandomWalk {
                min: None,
                max: Some(3.0),
                move_probability: None,
            }
        );
        assert!(matches!(
            config.moves[1].kind,
            FileMoveKind::Elastic {
                move_probability: None,
                ..
            }
        ));
    }

    #[test]
    fn vertex_moves_deserialize_with_their_volume() {
        let content = r#"
            [[moves]]
            name = "corners"
            kind = "vertex"
            dofs = ["type:A/a", "type:A/b"]
            volume = 2.0
            move-probability = 0.5
        "#;
        let config: FileConfig = toml::from_str(content).unwrap();
        assert_eq!(
            config.moves[0].kind,
            FileMoveKind::Vertex {
                volume: 2.0,
                move_probability: Some(0.5),
            }
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[alchemostat]\nperiod = 2\nspeed = 3\n").unwrap();
        assert!(matches!(
            FileConfig::from_file(&path),
            Err(CliError::FileParsing { .. })
        ));
    }
}
