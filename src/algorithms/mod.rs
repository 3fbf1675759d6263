pub mod overwrite;
pub mod random;
pub mod zero;


// Re-export the engine and its block fillers
pub use overwrite::{OverwriteEngine, OverwriteSummary, PassProgress, PassSummary};
pub use random::RandomFill;
pub use zero::ZeroFill;

use crate::PassLabel;

/// Source of the bytes written by one overwrite pass
pub trait BlockFill {
    /// Fill `buf` with the next block of pass data
    fn fill(&mut self, buf: &mut [u8]);
}

/// Ordered pass plan: `random_passes` random passes, then one zero pass
pub fn pass_plan(random_passes: u32) -> Vec<PassLabel> {
    (1..=random_passes)
        .map(PassLabel::Random)
        .chain(std::iter::once(PassLabel::FinalZero))
        .collect()
}

/// Filler for a pass label
pub fn filler_for(pass: PassLabel) -> Box<dyn BlockFill + Send> {
    match pass {
        PassLabel::Random(_) => Box::new(RandomFill::from_entropy()),
        PassLabel::FinalZero => Box::new(ZeroFill),
    }
}
