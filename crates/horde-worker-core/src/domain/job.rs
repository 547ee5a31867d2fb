//! Job descriptor: what the dispatch source handed us.

use serde::{Deserialize, Serialize};

use super::errors::JobDescriptorError;
use super::ids::{GenerationId, JobId};
use crate::ports::IdGenerator;

/// The kind of work a job asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Image,
    Text,
    /// Post-processing / interrogation of existing images.
    Alchemy,
}

impl JobKind {
    /// Only image output is safety checked.
    pub fn requires_safety_check(self) -> bool {
        matches!(self, JobKind::Image)
    }
}

/// Which kind of service dispatched the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOrigin {
    #[default]
    Unknown,
    LocalCustom,
    AiHordeOfficial,
    AiHordeFork,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub origin: DispatchOrigin,

    /// The requester asked for NSFW output to be censored.
    #[serde(default)]
    pub censor_nsfw: bool,
}

/// Immutable record of a popped job.
///
/// A job batches one or more generations that share the same parameters.
/// Build one with [`JobDescriptor::builder`]. Deserializing runs the same
/// checks as the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireJobDescriptor")]
pub struct JobDescriptor {
    job_id: JobId,
    kind: JobKind,
    generation_ids: Vec<GenerationId>,
    source: SourceMetadata,
    parameters: serde_json::Value,
    requires_post_processing: bool,
}

/// Unchecked wire form of [`JobDescriptor`].
#[derive(Deserialize)]
struct WireJobDescriptor {
    job_id: JobId,
    kind: JobKind,
    generation_ids: Vec<GenerationId>,
    #[serde(default)]
    source: SourceMetadata,
    #[serde(default)]
    parameters: serde_json::Value,
    #[serde(default)]
    requires_post_processing: bool,
}

impl TryFrom<WireJobDescriptor> for JobDescriptor {
    type Error = JobDescriptorError;

    fn try_from(wire: WireJobDescriptor) -> Result<Self, Self::Error> {
        if wire.generation_ids.is_empty() {
            return Err(JobDescriptorError::EmptyBatch(wire.job_id));
        }
        Ok(JobDescriptor {
            job_id: wire.job_id,
            kind: wire.kind,
            generation_ids: wire.generation_ids,
            source: wire.source,
            parameters: wire.parameters,
            requires_post_processing: wire.requires_post_processing,
        })
    }
}

impl JobDescriptor {
    pub fn builder(job_id: JobId, kind: JobKind) -> JobDescriptorBuilder {
        JobDescriptorBuilder {
            job_id,
            kind,
            generation_ids: None,
            batch_size: None,
            source: SourceMetadata::default(),
            parameters: serde_json::Value::Null,
            requires_post_processing: false,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn generation_ids(&self) -> &[GenerationId] {
        &self.generation_ids
    }

    pub fn batch_size(&self) -> usize {
        self.generation_ids.len()
    }

    pub fn source(&self) -> &SourceMetadata {
        &self.source
    }

    /// Opaque generation parameters, passed through to the collaborators.
    pub fn parameters(&self) -> &serde_json::Value {
        &self.parameters
    }

    pub fn requires_post_processing(&self) -> bool {
        self.requires_post_processing
    }

    pub fn requires_safety_check(&self) -> bool {
        self.kind.requires_safety_check()
    }
}

pub struct JobDescriptorBuilder {
    job_id: JobId,
    kind: JobKind,
    generation_ids: Option<Vec<GenerationId>>,
    batch_size: Option<usize>,
    source: SourceMetadata,
    parameters: serde_json::Value,
    requires_post_processing: bool,
}

impl JobDescriptorBuilder {
    /// Use the generation ids the dispatch source assigned.
    pub fn generation_ids(mut self, ids: impl IntoIterator<Item = GenerationId>) -> Self {
        self.generation_ids = Some(ids.into_iter().collect());
        self
    }

    /// Number of generations expected. Ids are minted when none were given.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn source(mut self, source: SourceMetadata) -> Self {
        self.source = source;
        self
    }

    pub fn parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn requires_post_processing(mut self, required: bool) -> Self {
        self.requires_post_processing = required;
        self
    }

    /// Validate and freeze the descriptor.
    ///
    /// Without explicit ids, `id_gen` mints `batch_size` (default 1) of them.
    pub fn build(self, id_gen: &dyn IdGenerator) -> Result<JobDescriptor, JobDescriptorError> {
        let generation_ids = match (self.generation_ids, self.batch_size) {
            (Some(ids), Some(expected)) if ids.len() != expected => {
                return Err(JobDescriptorError::BatchSizeMismatch {
                    expected,
                    actual: ids.len(),
                });
            }
            (Some(ids), _) => ids,
            (None, batch_size) => (0..batch_size.unwrap_or(1))
                .map(|_| id_gen.generate_generation_id())
                .collect(),
        };

        if generation_ids.is_empty() {
            return Err(JobDescriptorError::EmptyBatch(self.job_id));
        }

        Ok(JobDescriptor {
            job_id: self.job_id,
            kind: self.kind,
            generation_ids,
            source: self.source,
            parameters: self.parameters,
            requires_post_processing: self.requires_post_processing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{SystemClock, UlidGenerator};

    fn ids() -> UlidGenerator<SystemClock> {
        UlidGenerator::new(SystemClock)
    }

    #[test]
    fn missing_ids_are_minted_for_the_batch() {
        let job = JobDescriptor::builder(JobId::new("j1"), JobKind::Image)
            .batch_size(3)
            .build(&ids())
            .unwrap();

        assert_eq!(job.batch_size(), 3);
        assert!(job.generation_ids().iter().all(|id| id.as_str().starts_with("gen-")));
    }

    #[test]
    fn default_batch_is_one_generation() {
        let job = JobDescriptor::builder(JobId::new("j1"), JobKind::Text)
            .build(&ids())
            .unwrap();
        assert_eq!(job.batch_size(), 1);
        assert!(!job.requires_safety_check());
    }

    #[test]
    fn given_ids_keep_their_order() {
        let job = JobDescriptor::builder(JobId::new("j1"), JobKind::Image)
            .generation_ids([GenerationId::new("b"), GenerationId::new("a")])
            .build(&ids())
            .unwrap();
        assert_eq!(
            job.generation_ids(),
            &[GenerationId::new("b"), GenerationId::new("a")]
        );
    }

    #[test]
    fn mismatched_batch_is_rejected() {
        let err = JobDescriptor::builder(JobId::new("j1"), JobKind::Image)
            .generation_ids([GenerationId::new("a")])
            .batch_size(2)
            .build(&ids())
            .unwrap_err();
        assert!(matches!(
            err,
            JobDescriptorError::BatchSizeMismatch { expected: 2, actual: 1 }
        ));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = JobDescriptor::builder(JobId::new("j1"), JobKind::Image)
            .batch_size(0)
            .build(&ids())
            .unwrap_err();
        assert!(matches!(err, JobDescriptorError::EmptyBatch(_)));
    }

    #[test]
    fn descriptor_json_fills_defaults() {
        let json = r#"
        {
          "job_id": "j9",
          "kind": "image",
          "generation_ids": ["g1"]
        }"#;
        let job: JobDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(job.source().origin, DispatchOrigin::Unknown);
        assert!(!job.source().censor_nsfw);
        assert!(!job.requires_post_processing());
    }

    #[test]
    fn descriptor_json_without_generations_is_rejected() {
        let json = r#"{"job_id": "j0", "kind": "image", "generation_ids": []}"#;
        let err = serde_json::from_str::<JobDescriptor>(json).unwrap_err();
        assert!(err.to_string().contains("j0"), "{err}");
    }

    #[test]
    fn descriptor_survives_a_json_round_trip() {
        let job = JobDescriptor::builder(JobId::new("j1"), JobKind::Alchemy)
            .batch_size(2)
            .requires_post_processing(true)
            .build(&ids())
            .unwrap();
        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(serde_json::from_str::<JobDescriptor>(&json).unwrap(), job);
    }
}
