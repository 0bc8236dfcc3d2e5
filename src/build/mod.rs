// src/build/mod.rs
//! Build-Validate-Autofix controller. Drives the generation collaborator
//! through a bounded repair loop until the structural contract passes:
//! Draft -> Validating -> {Published | Patching -> Validating | Failed}.

pub mod patch;
pub mod validate;

use tracing::{info, warn};

use crate::generate::{BuildRequest, Generator};
use patch::PatchOutcome;
use validate::Contract;

/// Terminal result of one build loop. Attempt count is the number of
/// validation rounds performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Published { artifact: String, attempts: u32 },
    Failed { reason: String, attempts: u32 },
}

impl BuildOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            BuildOutcome::Published { attempts, .. } => *attempts,
            BuildOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Run the bounded loop. One validation failure is repaired per iteration:
/// patch first, full regeneration (with the reason attached) when the patch
/// produces no change.
pub async fn run_build_loop(
    generator: &dyn Generator,
    req: &BuildRequest,
    contract: &Contract,
    max_attempts: u32,
) -> BuildOutcome {
    let mut artifact = match generator.build(req, None).await {
        Ok(a) => a,
        Err(e) => {
            return BuildOutcome::Failed {
                reason: format!("generation failed: {e}"),
                attempts: 0,
            };
        }
    };

    for attempt in 1..=max_attempts {
        metrics::counter!("build_attempts_total").increment(1);
        let reason = match validate::validate(&artifact, contract) {
            Ok(()) => {
                info!(attempt, generator = generator.name(), "artifact validated");
                return BuildOutcome::Published { artifact, attempts: attempt };
            }
            Err(reason) => reason,
        };
        warn!(attempt, %reason, "artifact failed validation");

        if attempt == max_attempts {
            metrics::counter!("build_exhausted_total").increment(1);
            return BuildOutcome::Failed {
                reason,
                attempts: attempt,
            };
        }

        // Patching: scoped diff, applied deterministically.
        let patched = match generator.patch(&reason, &artifact).await {
            Ok(diff) => match patch::apply(&artifact, &diff) {
                PatchOutcome::Applied(new) if new != artifact => Some(new),
                PatchOutcome::Applied(_) => {
                    warn!(attempt, "patch applied but changed nothing");
                    None
                }
                PatchOutcome::Rejected(why) => {
                    warn!(attempt, %why, "patch rejected");
                    None
                }
            },
            Err(e) => {
                warn!(attempt, error = ?e, "patch generation failed");
                None
            }
        };

        artifact = match patched {
            Some(new) => new,
            // Fall back to full regeneration with the explicit reason.
            None => match generator.build(req, Some(&reason)).await {
                Ok(a) => a,
                Err(e) => {
                    return BuildOutcome::Failed {
                        reason: format!("regeneration failed: {e} (after: {reason})"),
                        attempts: attempt,
                    };
                }
            },
        };
    }

    // max_attempts >= 1, so the loop always returns before this point.
    unreachable!("build loop must terminate within max_attempts");
}
