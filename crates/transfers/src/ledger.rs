//! Verification ledger: append-only evidence collected at each checkpoint.
//!
//! The ledger never overwrites. The authoritative value of a step is its first
//! `verified = true` entry; failed attempts (`verified = false`) stay on record
//! next to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use waypoint_core::DomainError;

use crate::error::TransferError;

/// Lifecycle checkpoints that can carry evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStep {
    Creation,
    Shipping,
    CustomsSubmission,
    CustomsClearance,
    QualityCheck,
    Receipt,
}

impl VerificationStep {
    pub const ALL: [VerificationStep; 6] = [
        VerificationStep::Creation,
        VerificationStep::Shipping,
        VerificationStep::CustomsSubmission,
        VerificationStep::CustomsClearance,
        VerificationStep::QualityCheck,
        VerificationStep::Receipt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStep::Creation => "CREATION",
            VerificationStep::Shipping => "SHIPPING",
            VerificationStep::CustomsSubmission => "CUSTOMS_SUBMISSION",
            VerificationStep::CustomsClearance => "CUSTOMS_CLEARANCE",
            VerificationStep::QualityCheck => "QUALITY_CHECK",
            VerificationStep::Receipt => "RECEIPT",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VerificationStep::Creation => "Creation",
            VerificationStep::Shipping => "Shipping",
            VerificationStep::CustomsSubmission => "Customs submission",
            VerificationStep::CustomsClearance => "Customs clearance",
            VerificationStep::QualityCheck => "Quality check",
            VerificationStep::Receipt => "Receipt",
        }
    }
}

impl core::fmt::Display for VerificationStep {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for VerificationStep {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VerificationStep::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown verification step: {s}")))
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub step: VerificationStep,
    pub verified: bool,
    pub verifier: String,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
}

/// What appending a submission would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAppend {
    /// New evidence; append it.
    Append,
    /// Retry of evidence already on record: the same verifier re-passing a
    /// verified step, or re-failing a step that is still unverified. Accepted,
    /// but nothing is written.
    Repeat,
}

/// Append-only verification record owned by one transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationLedger {
    entries: Vec<Verification>,
}

impl VerificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Verification] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_step(&self, step: VerificationStep) -> impl Iterator<Item = &Verification> {
        self.entries.iter().filter(move |v| v.step == step)
    }

    /// The authoritative (first) verified entry for `step`.
    pub fn verified(&self, step: VerificationStep) -> Option<&Verification> {
        self.for_step(step).find(|v| v.verified)
    }

    pub fn is_verified(&self, step: VerificationStep) -> bool {
        self.verified(step).is_some()
    }

    /// Most recent failed attempt, if the step is still unverified.
    pub fn outstanding_failure(&self, step: VerificationStep) -> Option<&Verification> {
        if self.is_verified(step) {
            return None;
        }
        self.for_step(step).filter(|v| !v.verified).last()
    }

    /// Whether any step has failed attempts and no verified entry.
    pub fn has_outstanding_failures(&self) -> bool {
        VerificationStep::ALL
            .into_iter()
            .any(|step| self.outstanding_failure(step).is_some())
    }

    /// Decide whether a submission may be appended.
    ///
    /// Once a step is verified, only an identical passing retry is accepted;
    /// anything else conflicts with the recorded evidence.
    pub fn check_append(
        &self,
        step: VerificationStep,
        verifier: &str,
        verified: bool,
    ) -> Result<LedgerAppend, TransferError> {
        if let Some(existing) = self.verified(step) {
            if verified && existing.verifier == verifier {
                return Ok(LedgerAppend::Repeat);
            }
            return Err(TransferError::DuplicateVerification(step));
        }
        if !verified && self.for_step(step).any(|v| !v.verified && v.verifier == verifier) {
            return Ok(LedgerAppend::Repeat);
        }
        Ok(LedgerAppend::Append)
    }

    pub(crate) fn push(&mut self, entry: Verification) {
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(step: VerificationStep, verified: bool, verifier: &str) -> Verification {
        Verification {
            step,
            verified,
            verifier: verifier.to_string(),
            timestamp: Utc::now(),
            notes: None,
        }
    }

    #[test]
    fn verified_step_rejects_conflicting_submissions() {
        let mut ledger = VerificationLedger::new();
        ledger.push(entry(VerificationStep::Shipping, true, "dock-7"));

        assert_eq!(
            ledger.check_append(VerificationStep::Shipping, "dock-9", true),
            Err(TransferError::DuplicateVerification(VerificationStep::Shipping))
        );
        assert_eq!(
            ledger.check_append(VerificationStep::Shipping, "dock-7", false),
            Err(TransferError::DuplicateVerification(VerificationStep::Shipping))
        );
        assert_eq!(
            ledger.check_append(VerificationStep::Shipping, "auditor", false),
            Err(TransferError::DuplicateVerification(VerificationStep::Shipping))
        );
    }

    #[test]
    fn retried_pass_from_same_verifier_is_a_repeat() {
        let mut ledger = VerificationLedger::new();
        ledger.push(entry(VerificationStep::Shipping, true, "dock-7"));

        assert_eq!(
            ledger.check_append(VerificationStep::Shipping, "dock-7", true),
            Ok(LedgerAppend::Repeat)
        );
    }

    #[test]
    fn repeated_failure_from_same_verifier_is_a_repeat() {
        let mut ledger = VerificationLedger::new();
        ledger.push(entry(VerificationStep::QualityCheck, false, "qa-1"));

        assert_eq!(
            ledger.check_append(VerificationStep::QualityCheck, "qa-1", false),
            Ok(LedgerAppend::Repeat)
        );
        assert_eq!(
            ledger.check_append(VerificationStep::QualityCheck, "qa-2", false),
            Ok(LedgerAppend::Append)
        );
        assert_eq!(
            ledger.check_append(VerificationStep::QualityCheck, "qa-1", true),
            Ok(LedgerAppend::Append)
        );
    }

    #[test]
    fn first_verified_entry_is_authoritative() {
        let mut ledger = VerificationLedger::new();
        ledger.push(entry(VerificationStep::Receipt, false, "clerk"));
        ledger.push(entry(VerificationStep::Receipt, true, "manager"));

        assert_eq!(ledger.verified(VerificationStep::Receipt).unwrap().verifier, "manager");
        assert!(ledger.outstanding_failure(VerificationStep::Receipt).is_none());
        assert!(!ledger.has_outstanding_failures());
    }

    #[test]
    fn failure_without_verification_is_outstanding() {
        let mut ledger = VerificationLedger::new();
        ledger.push(entry(VerificationStep::CustomsClearance, false, "broker"));

        assert!(ledger.has_outstanding_failures());
        assert_eq!(
            ledger.outstanding_failure(VerificationStep::CustomsClearance).unwrap().verifier,
            "broker"
        );
    }
}
