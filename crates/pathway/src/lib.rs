pub mod assembler;
pub mod graph;
pub mod selector;

pub use assembler::{Assembly, DropReason, DroppedRelationship, GraphAssembler};
pub use graph::{AssembledGraph, EventMerge, EvidenceRecord, Relationship, RelationshipType};
pub use selector::{NoPathway, Pathway, PathwaySelector};
