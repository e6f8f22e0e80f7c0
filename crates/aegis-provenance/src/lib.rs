// Hardware-rooted provenance for readings cited as decision evidence.
pub mod epoch;
pub mod ledger;
pub mod record;

pub use epoch::{EpochAnchor, MerkleProof, MerkleVerification};
pub use ledger::{ProvenanceLedger, DEFAULT_EPOCH_CAPACITY};
pub use record::{
    provenance_signing_message, CorruptionReport, HardwareRoot, ProvenanceExport,
    ProvenanceRecord, ProvenanceStatus, ProvenanceVerification,
};
