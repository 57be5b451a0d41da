//! Message Compliance — gate for operator-facing text
//!
//! Every message the supervisor shows an operator must look like one of the
//! approved reference messages.
//!
//! ```text
//! candidate message
//!     │
//!     ├─ prefix / ≤ 3 sentences / approved verb ──✗──→ reject (score 0)
//!     ├─ forbidden phrase scan ───────────────────✗──→ reject (score 0)
//!     │
//!     ▼
//! max similarity over reference corpus ≥ 0.90 ? pass : reject + nearest exemplar
//! ```

pub mod corpus;
pub mod gate;
pub mod rules;
pub mod scorer;

pub use corpus::{ReferenceCorpus, DEFAULT_REFERENCE_MESSAGES, MESSAGES_KEY};
pub use gate::{ComplianceVerdict, MessageComplianceGate, SIMILARITY_THRESHOLD};
pub use rules::{RuleViolation, APPROVED_VERBS, FORBIDDEN_PHRASES, MAX_SENTENCES, REQUIRED_PREFIX};
pub use scorer::{CorpusIndex, ExactMatchScorer, NgramCosineScorer, SimilarityScorer};
