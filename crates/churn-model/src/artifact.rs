//! Model artifact persistence via bincode.

use std::path::Path;

use chrono::{DateTime, Utc};
use churn_rf::RandomForest;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::ModelError;
use crate::schema::FeatureSchema;

/// Current binary format version.
pub const FORMAT_VERSION: u32 = 1;

/// Versioned envelope. `format_version` is the leading field so it can be
/// read before the rest of the payload.
#[derive(Serialize, Deserialize)]
struct ModelEnvelope<A> {
    format_version: u32,
    artifact: A,
}

/// A fitted forest together with the schema and encoder it was trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub trained_at: DateTime<Utc>,
    pub schema: FeatureSchema,
    /// Label for each class index, `[negative, positive]`.
    pub class_names: Vec<String>,
    pub forest: RandomForest,
}

impl ModelArtifact {
    /// Write the artifact to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::SerializeModel`] | bincode encoding failed |
    /// | [`ModelError::WriteModel`] | directory creation or file write failed |
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            artifact: self,
        };
        let bytes =
            bincode::serialize(&envelope).map_err(|e| ModelError::SerializeModel { source: e })?;

        let write_err = |e| ModelError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, &bytes).map_err(write_err)?;

        info!(
            size_bytes = bytes.len(),
            n_trees = self.forest.n_trees(),
            n_features = self.schema.len(),
            "model saved"
        );
        Ok(())
    }

    /// Read an artifact written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::ReadModel`] | file read failed |
    /// | [`ModelError::DeserializeModel`] | bincode decoding failed |
    /// | [`ModelError::IncompatibleModelVersion`] | format version mismatch |
    /// | [`ModelError::SchemaMismatch`] | forest and schema disagree on feature count |
    #[instrument(fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path).map_err(|e| ModelError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;
        let decode_err = |e| ModelError::DeserializeModel {
            path: path.to_path_buf(),
            source: e,
        };

        let format_version: u32 = bincode::deserialize(&bytes).map_err(decode_err)?;
        if format_version != FORMAT_VERSION {
            return Err(ModelError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: format_version,
                path: path.to_path_buf(),
            });
        }

        let envelope: ModelEnvelope<ModelArtifact> =
            bincode::deserialize(&bytes).map_err(decode_err)?;
        let artifact = envelope.artifact;
        if artifact.forest.n_features() != artifact.schema.len() {
            return Err(ModelError::SchemaMismatch {
                path: path.to_path_buf(),
                forest: artifact.forest.n_features(),
                schema: artifact.schema.len(),
            });
        }

        debug!(
            n_trees = artifact.forest.n_trees(),
            n_features = artifact.schema.len(),
            trained_at = %artifact.trained_at,
            "model loaded"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use churn_rf::RandomForestConfig;
    use tempfile::TempDir;

    use super::*;
    use crate::encoder::CategoryEncoder;
    use crate::schema::{ColumnKind, FeatureColumn};

    fn artifact() -> ModelArtifact {
        let mut encoder = CategoryEncoder::new();
        encoder.fit_column("Contract", ["Month-to-month", "One year", "Two year"]);
        let schema = FeatureSchema::new(
            vec![
                FeatureColumn {
                    name: "tenure".into(),
                    kind: ColumnKind::Numeric,
                    fill_value: Some(20.0),
                },
                FeatureColumn {
                    name: "Contract".into(),
                    kind: ColumnKind::Categorical,
                    fill_value: None,
                },
            ],
            encoder,
        );
        let features = vec![
            vec![1.0, 0.0],
            vec![3.0, 0.0],
            vec![5.0, 0.0],
            vec![40.0, 2.0],
            vec![50.0, 1.0],
            vec![60.0, 2.0],
        ];
        let labels = vec![1, 1, 1, 0, 0, 0];
        let names: Vec<String> = schema.names().map(String::from).collect();
        let forest = RandomForestConfig::new(5)
            .unwrap()
            .with_n_classes(Some(2))
            .fit(&features, &labels, &names)
            .unwrap()
            .into_forest();
        ModelArtifact {
            trained_at: "2024-02-01T12:00:00Z".parse().unwrap(),
            schema,
            class_names: vec!["No".into(), "Yes".into()],
            forest,
        }
    }

    #[test]
    fn round_trip_keeps_schema_and_predictions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models").join("churn_model.bin");
        let original = artifact();
        original.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.schema, original.schema);
        assert_eq!(loaded.trained_at, original.trained_at);
        assert_eq!(loaded.class_names, original.class_names);
        for sample in [[2.0, 0.0], [55.0, 2.0], [20.0, 1.0]] {
            assert_eq!(
                loaded.forest.predict_proba(&sample).unwrap().as_slice(),
                original.forest.predict_proba(&sample).unwrap().as_slice()
            );
        }
    }

    #[test]
    fn load_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ModelArtifact::load(&dir.path().join("missing.bin")),
            Err(ModelError::ReadModel { .. })
        ));

        let corrupt = dir.path().join("corrupt.bin");
        std::fs::write(&corrupt, b"no").unwrap();
        assert!(matches!(
            ModelArtifact::load(&corrupt),
            Err(ModelError::DeserializeModel { .. })
        ));

        let future = dir.path().join("future.bin");
        let bytes = bincode::serialize(&ModelEnvelope {
            format_version: FORMAT_VERSION + 1,
            artifact: 0u8,
        })
        .unwrap();
        std::fs::write(&future, bytes).unwrap();
        assert!(matches!(
            ModelArtifact::load(&future),
            Err(ModelError::IncompatibleModelVersion { found: 2, .. })
        ));
    }
}
