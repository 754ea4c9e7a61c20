//! Bounded validate/correct loop

use dataqna_core::{AuditEntry, BuildContext, SqlValidator, Stage};
use std::time::Duration;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{within, PipelineError};

/// Result of driving one candidate through the validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugOutcome {
    /// Last candidate considered; only executable when `valid`
    pub sql: String,
    pub valid: bool,
    /// Corrections adopted on the way
    pub corrections: usize,
    /// Validator calls made
    pub rounds: usize,
}

pub struct DebugLoop<'a> {
    validator: &'a dyn SqlValidator,
    max_rounds: usize,
    adopt_corrections: bool,
    call_timeout: Duration,
}

impl<'a> DebugLoop<'a> {
    pub fn new(validator: &'a dyn SqlValidator, config: &PipelineConfig) -> Self {
        Self {
            validator,
            max_rounds: config.debug_rounds(),
            adopt_corrections: config.debugger_enabled,
            call_timeout: config.call_timeout(),
        }
    }

    /// Validate `candidate`, adopting corrections until it is valid, the
    /// validator stops offering corrections, or the round bound is reached.
    ///
    /// Running out of rounds is a normal outcome (`valid == false`). Each
    /// round is recorded on `audit`.
    pub async fn run(
        &self,
        ctx: &BuildContext<'_>,
        candidate: String,
        audit: &mut AuditEntry,
    ) -> Result<DebugOutcome, PipelineError> {
        let mut outcome = DebugOutcome {
            sql: candidate,
            valid: false,
            corrections: 0,
            rounds: 0,
        };

        while outcome.rounds < self.max_rounds {
            outcome.rounds += 1;
            let verdict = within(
                self.call_timeout,
                Stage::Validation,
                self.validator.validate(ctx, &outcome.sql),
                PipelineError::Validation,
            )
            .await?;

            if verdict.valid {
                audit.record(format!("Round {}: SQL is valid", outcome.rounds));
                outcome.valid = true;
                return Ok(outcome);
            }

            let diagnostic = verdict.diagnostic.unwrap_or_else(|| "no diagnostic".to_string());
            audit.record(format!(
                "Round {}: SQL is invalid: {}\n{}",
                outcome.rounds, diagnostic, outcome.sql
            ));

            let correction = verdict.corrected_sql.filter(|sql| {
                let sql = sql.trim();
                !sql.is_empty() && sql != outcome.sql.trim()
            });

            match correction {
                Some(sql) if self.adopt_corrections => {
                    debug!(round = outcome.rounds, "Adopting corrected SQL");
                    audit.record(format!("Round {}: adopted correction\n{}", outcome.rounds, sql));
                    outcome.sql = sql;
                    outcome.corrections += 1;
                }
                Some(_) => {
                    audit.record("Debugger disabled, correction ignored");
                    return Ok(outcome);
                }
                None => {
                    audit.record(format!("Round {}: no correction offered", outcome.rounds));
                    return Ok(outcome);
                }
            }
        }

        audit.record(format!(
            "Gave up after {} rounds without a valid statement",
            outcome.rounds
        ));
        Ok(outcome)
    }
}
