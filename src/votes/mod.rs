//! Quadratic vote weighting and project boosts
//!
//! Converts a voter's point allocation plus an optional SAKA-funded
//! intensity into a recorded, weighted vote. The intensity debit and the
//! vote record are all-or-nothing: a failed debit records no vote, and a
//! failed record reverses the debit.

use std::sync::Arc;

use bson::DateTime;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::schemas::{Allocation, VoteDoc};
use crate::ledger::WalletLedger;
use crate::store::SakaStore;
use crate::types::{GranaryError, Result};

/// Intensity levels run 1..=5
pub const MAX_INTENSITY: i32 = 5;

/// Vote tuning, sourced from deployment configuration
#[derive(Debug, Clone, Copy)]
pub struct VoteConfig {
    /// Whether intensity may be funded with SAKA
    pub saka_vote_enabled: bool,
    /// Whether projects may be boosted with SAKA
    pub boost_enabled: bool,
    /// Grains debited per intensity level
    pub cost_per_intensity: i64,
}

/// Outcome of a recorded vote
#[derive(Debug, Serialize)]
pub struct VoteReceipt {
    /// Effective weight entering aggregation, exact float
    pub weight: f64,
    /// Grains debited for the intensity
    pub saka_spent: i64,
    /// Whether SAKA intensity applied (false when the feature is off)
    pub saka_applied: bool,
}

/// Outcome of a project boost
#[derive(Debug, Serialize)]
pub struct BoostReceipt {
    pub new_saka_score: i64,
    pub new_saka_supporters_count: usize,
    pub saka_spent: i64,
}

/// Effective weight of a vote: allocated points amplified by the square
/// root of intensity. The sqrt is kept as exact floating point - display
/// rounding is the client's concern, aggregation uses the full value.
pub fn vote_weight(total_points: i64, intensity: i32) -> f64 {
    total_points as f64 * (intensity as f64).sqrt()
}

/// Vote recording service
#[derive(Clone)]
pub struct VoteService {
    store: Arc<SakaStore>,
    ledger: WalletLedger,
    config: VoteConfig,
}

impl VoteService {
    pub fn new(store: Arc<SakaStore>, config: VoteConfig) -> Self {
        let ledger = WalletLedger::new(Arc::clone(&store));
        Self {
            store,
            ledger,
            config,
        }
    }

    pub fn config(&self) -> VoteConfig {
        self.config
    }

    /// Cast (or replace) a quadratic vote
    ///
    /// Latest vote wins: resubmitting for the same poll replaces the prior
    /// vote, and the new intensity is paid for in full - replaced votes are
    /// not refunded.
    pub async fn cast_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        allocations: Vec<Allocation>,
        intensity: Option<i32>,
    ) -> Result<VoteReceipt> {
        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| GranaryError::NotFound(format!("poll {}", poll_id)))?;

        if !poll.is_open {
            return Err(GranaryError::BadRequest(format!(
                "poll {} is closed",
                poll_id
            )));
        }

        if allocations.is_empty() {
            return Err(GranaryError::BadRequest("no point allocations".into()));
        }
        for alloc in &allocations {
            if alloc.points < 0 {
                return Err(GranaryError::BadRequest(format!(
                    "negative points for option {}",
                    alloc.option_id
                )));
            }
            if !poll.has_option(&alloc.option_id) {
                return Err(GranaryError::BadRequest(format!(
                    "unknown option {}",
                    alloc.option_id
                )));
            }
        }

        let total_points: i64 = allocations.iter().map(|a| a.points).sum();
        if total_points > poll.max_points {
            return Err(GranaryError::PointBudgetExceeded {
                allocated: total_points,
                max_points: poll.max_points,
            });
        }

        let requested_intensity = intensity.unwrap_or(1);
        if !(1..=MAX_INTENSITY).contains(&requested_intensity) {
            return Err(GranaryError::BadRequest(format!(
                "intensity must be within 1..={}, got {}",
                MAX_INTENSITY, requested_intensity
            )));
        }

        // With SAKA voting disabled the intensity is fixed at effective 1
        // and nothing is debited - the vote silently degrades to plain
        // point counting.
        let (effective_intensity, cost) = if self.config.saka_vote_enabled {
            (
                requested_intensity,
                requested_intensity as i64 * self.config.cost_per_intensity,
            )
        } else {
            (1, 0)
        };

        if cost > 0 {
            // Debit before recording: a wallet that cannot cover the
            // intensity must leave no vote behind.
            self.ledger
                .debit(user_id, cost, format!("vote intensity x{}", effective_intensity))
                .await?;
        }

        let weight = vote_weight(total_points, effective_intensity);
        let vote = VoteDoc {
            poll_id: poll_id.to_string(),
            user_id: user_id.to_string(),
            allocations,
            intensity: effective_intensity,
            weight,
            saka_spent: cost,
            cast_at: DateTime::now(),
            ..VoteDoc::default()
        };

        if let Err(e) = self.store.upsert_vote(vote).await {
            // The debit committed but the vote did not: reverse it so no
            // grains are spent on an action that never happened.
            if cost > 0 {
                if let Err(rollback_err) = self.ledger.rollback_spend(user_id, cost).await {
                    warn!(
                        user_id,
                        cost,
                        error = %rollback_err,
                        "Vote debit rollback failed"
                    );
                }
            }
            return Err(e);
        }

        info!(
            poll_id,
            user_id,
            total_points,
            intensity = effective_intensity,
            weight,
            saka_spent = cost,
            "Vote recorded"
        );

        Ok(VoteReceipt {
            weight,
            saka_spent: cost,
            saka_applied: self.config.saka_vote_enabled,
        })
    }

    /// Boost a project by planting grains into it
    pub async fn boost_project(
        &self,
        project_id: &str,
        user_id: &str,
        amount: i64,
    ) -> Result<BoostReceipt> {
        if !self.config.boost_enabled {
            return Err(GranaryError::FeatureDisabled("saka_project_boost"));
        }

        // Confirm the target before taking grains; the rollback below still
        // covers a project vanishing between the check and the apply.
        if self.store.get_project(project_id).await?.is_none() {
            return Err(GranaryError::NotFound(format!("project {}", project_id)));
        }

        self.ledger.debit(user_id, amount, "project boost").await?;

        let project = match self.store.apply_boost(project_id, user_id, amount).await {
            Ok(p) => p,
            Err(e) => {
                if let Err(rollback_err) = self.ledger.rollback_spend(user_id, amount).await {
                    warn!(
                        user_id,
                        amount,
                        error = %rollback_err,
                        "Boost debit rollback failed"
                    );
                }
                return Err(e);
            }
        };

        info!(
            project_id,
            user_id,
            amount,
            new_score = project.saka_score,
            "Project boosted"
        );

        Ok(BoostReceipt {
            new_saka_score: project.saka_score,
            new_saka_supporters_count: project.saka_supporters.len(),
            saka_spent: amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{PollDoc, PollOption, ProjectDoc};
    use crate::ledger::WalletLedger;

    const COST: i64 = 5;

    fn options() -> Vec<PollOption> {
        vec![
            PollOption {
                option_id: "opt-a".into(),
                label: "Option A".into(),
            },
            PollOption {
                option_id: "opt-b".into(),
                label: "Option B".into(),
            },
        ]
    }

    async fn setup(saka_enabled: bool) -> (Arc<SakaStore>, VoteService, WalletLedger) {
        let store = Arc::new(SakaStore::memory_only());
        store
            .insert_poll(PollDoc::new("poll-1", "Which path?", 100, options()))
            .await
            .unwrap();

        let service = VoteService::new(
            Arc::clone(&store),
            VoteConfig {
                saka_vote_enabled: saka_enabled,
                boost_enabled: true,
                cost_per_intensity: COST,
            },
        );
        let ledger = WalletLedger::new(Arc::clone(&store));
        (store, service, ledger)
    }

    fn alloc(points: i64) -> Vec<Allocation> {
        vec![Allocation {
            option_id: "opt-a".into(),
            points,
        }]
    }

    #[test]
    fn test_weight_formula() {
        // 50 points at intensity 3: 50 * sqrt(3) = 86.60...
        let w = vote_weight(50, 3);
        assert!((w - 86.60254037844386).abs() < 1e-9);

        assert_eq!(vote_weight(50, 1), 50.0);
        assert_eq!(vote_weight(0, 5), 0.0);
    }

    #[tokio::test]
    async fn test_saka_vote_debits_and_weights() {
        let (store, service, ledger) = setup(true).await;
        ledger.credit("alice", 100, "content consumption").await.unwrap();

        let receipt = service
            .cast_vote("poll-1", "alice", alloc(50), Some(3))
            .await
            .unwrap();

        assert_eq!(receipt.saka_spent, 15);
        assert!(receipt.saka_applied);
        assert!((receipt.weight - 86.60254037844386).abs() < 1e-9);

        let wallet = ledger.snapshot("alice").await.unwrap().unwrap();
        assert_eq!(wallet.balance, 85);
        assert!(wallet.invariant_holds());

        let vote = store.get_vote("poll-1", "alice").await.unwrap().unwrap();
        assert_eq!(vote.intensity, 3);
        assert_eq!(vote.saka_spent, 15);
    }

    #[tokio::test]
    async fn test_vote_without_saka_feature() {
        let (store, service, ledger) = setup(false).await;
        ledger.credit("bob", 100, "content consumption").await.unwrap();

        let receipt = service
            .cast_vote("poll-1", "bob", alloc(50), Some(3))
            .await
            .unwrap();

        // Weight is the plain point total, intensity forced to 1, no debit
        assert_eq!(receipt.weight, 50.0);
        assert_eq!(receipt.saka_spent, 0);
        assert!(!receipt.saka_applied);

        assert_eq!(ledger.snapshot("bob").await.unwrap().unwrap().balance, 100);
        let vote = store.get_vote("poll-1", "bob").await.unwrap().unwrap();
        assert_eq!(vote.intensity, 1);
    }

    #[tokio::test]
    async fn test_insufficient_balance_records_nothing() {
        let (store, service, ledger) = setup(true).await;
        ledger.credit("carol", 5, "content consumption").await.unwrap();

        // intensity 3 needs 15 grains, wallet holds 5
        let err = service
            .cast_vote("poll-1", "carol", alloc(50), Some(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GranaryError::InsufficientBalance {
                required: 15,
                available: 5
            }
        ));

        // No vote, no balance change
        assert!(store.get_vote("poll-1", "carol").await.unwrap().is_none());
        assert_eq!(ledger.snapshot("carol").await.unwrap().unwrap().balance, 5);
    }

    #[tokio::test]
    async fn test_point_budget_is_enforced() {
        let (store, service, ledger) = setup(true).await;
        ledger.credit("dave", 100, "content consumption").await.unwrap();

        let allocations = vec![
            Allocation {
                option_id: "opt-a".into(),
                points: 70,
            },
            Allocation {
                option_id: "opt-b".into(),
                points: 40,
            },
        ];
        let err = service
            .cast_vote("poll-1", "dave", allocations, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GranaryError::PointBudgetExceeded {
                allocated: 110,
                max_points: 100
            }
        ));

        // Budget rejection happens before any debit
        assert_eq!(ledger.snapshot("dave").await.unwrap().unwrap().balance, 100);
        assert!(store.get_vote("poll-1", "dave").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_allocation_validation() {
        let (_store, service, ledger) = setup(true).await;
        ledger.credit("erin", 100, "content consumption").await.unwrap();

        let negative = vec![Allocation {
            option_id: "opt-a".into(),
            points: -10,
        }];
        assert!(matches!(
            service.cast_vote("poll-1", "erin", negative, None).await,
            Err(GranaryError::BadRequest(_))
        ));

        let unknown = vec![Allocation {
            option_id: "opt-z".into(),
            points: 10,
        }];
        assert!(matches!(
            service.cast_vote("poll-1", "erin", unknown, None).await,
            Err(GranaryError::BadRequest(_))
        ));

        assert!(matches!(
            service.cast_vote("poll-1", "erin", alloc(10), Some(6)).await,
            Err(GranaryError::BadRequest(_))
        ));
        assert!(matches!(
            service.cast_vote("poll-1", "erin", alloc(10), Some(0)).await,
            Err(GranaryError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_resubmission_replaces_and_spends_again() {
        let (store, service, ledger) = setup(true).await;
        ledger.credit("fay", 100, "content consumption").await.unwrap();

        service
            .cast_vote("poll-1", "fay", alloc(40), Some(2))
            .await
            .unwrap();
        service
            .cast_vote("poll-1", "fay", alloc(60), Some(1))
            .await
            .unwrap();

        let vote = store.get_vote("poll-1", "fay").await.unwrap().unwrap();
        assert_eq!(vote.total_points(), 60);
        assert_eq!(vote.intensity, 1);

        // Both intensities were paid for: 10 + 5
        let wallet = ledger.snapshot("fay").await.unwrap().unwrap();
        assert_eq!(wallet.balance, 85);
        assert_eq!(wallet.total_planted, 15);
    }

    #[tokio::test]
    async fn test_unknown_poll() {
        let (_store, service, _ledger) = setup(true).await;
        assert!(matches!(
            service.cast_vote("poll-404", "gil", alloc(10), None).await,
            Err(GranaryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_poll_rejects_votes() {
        let (store, service, ledger) = setup(true).await;
        ledger.credit("hana", 100, "content consumption").await.unwrap();

        let mut poll = PollDoc::new("poll-closed", "Done?", 100, options());
        poll.is_open = false;
        store.insert_poll(poll).await.unwrap();

        assert!(matches!(
            service.cast_vote("poll-closed", "hana", alloc(10), None).await,
            Err(GranaryError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_boost_debits_and_scores() {
        let (store, service, ledger) = setup(true).await;
        ledger.credit("ivy", 100, "content consumption").await.unwrap();
        store
            .insert_project(ProjectDoc::new("proj-1", "Sorghum commons"))
            .await
            .unwrap();

        let receipt = service.boost_project("proj-1", "ivy", 25).await.unwrap();
        assert_eq!(receipt.new_saka_score, 25);
        assert_eq!(receipt.new_saka_supporters_count, 1);
        assert_eq!(receipt.saka_spent, 25);

        // Boosting twice does not duplicate the supporter
        let receipt = service.boost_project("proj-1", "ivy", 10).await.unwrap();
        assert_eq!(receipt.new_saka_score, 35);
        assert_eq!(receipt.new_saka_supporters_count, 1);

        let wallet = ledger.snapshot("ivy").await.unwrap().unwrap();
        assert_eq!(wallet.balance, 65);
        assert!(wallet.invariant_holds());
    }

    #[tokio::test]
    async fn test_boost_insufficient_balance() {
        let (store, service, ledger) = setup(true).await;
        ledger.credit("jon", 10, "content consumption").await.unwrap();
        store
            .insert_project(ProjectDoc::new("proj-1", "Sorghum commons"))
            .await
            .unwrap();

        let err = service.boost_project("proj-1", "jon", 50).await.unwrap_err();
        assert!(matches!(err, GranaryError::InsufficientBalance { .. }));

        let project = store.get_project("proj-1").await.unwrap().unwrap();
        assert_eq!(project.saka_score, 0);
        assert_eq!(ledger.snapshot("jon").await.unwrap().unwrap().balance, 10);
    }

    #[tokio::test]
    async fn test_boost_unknown_project_takes_nothing() {
        let (_store, service, ledger) = setup(true).await;
        ledger.credit("kim", 100, "content consumption").await.unwrap();

        let err = service
            .boost_project("proj-404", "kim", 25)
            .await
            .unwrap_err();
        assert!(matches!(err, GranaryError::NotFound(_)));
        assert_eq!(ledger.snapshot("kim").await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_boost_feature_disabled() {
        let store = Arc::new(SakaStore::memory_only());
        let service = VoteService::new(
            Arc::clone(&store),
            VoteConfig {
                saka_vote_enabled: true,
                boost_enabled: false,
                cost_per_intensity: COST,
            },
        );

        let err = service.boost_project("proj-1", "lee", 10).await.unwrap_err();
        assert!(matches!(err, GranaryError::FeatureDisabled(_)));
    }
}
