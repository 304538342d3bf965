use std::sync::Arc;

use anyhow::anyhow;
use assert_matches::assert_matches;
use async_trait::async_trait;
use mockall::mock;
use uuid::Uuid;

use shared_config::SchedulingPolicy;
use shared_models::{ErrorKind, NotificationDispatcher, NotificationMessage, ProcedureType};
use shared_utils::test_utils::{date, test_id, time};
use waitlist_cell::*;

use super::{WaitlistTestContext, INACTIVE_PRACTITIONER, OTHER_PRACTITIONER, PRACTITIONER, STAFF};

mock! {
    pub Dispatcher {}

    #[async_trait]
    impl NotificationDispatcher for Dispatcher {
        async fn send(&self, patient_id: Uuid, message: NotificationMessage) -> anyhow::Result<()>;
    }
}

/// Cancels the entry behind the engine's back while "delivering".
struct CancellingDispatcher {
    store: Arc<InMemoryWaitlistStore>,
}

#[async_trait]
impl NotificationDispatcher for CancellingDispatcher {
    async fn send(&self, _patient_id: Uuid, message: NotificationMessage) -> anyhow::Result<()> {
        let NotificationMessage::SlotAvailable { entry_id, .. } = message;
        if let Some(mut entry) = self.store.find_by_id(entry_id).await? {
            entry.status = WaitlistStatus::Cancelled;
            self.store.save(&entry).await?;
        }
        Ok(())
    }
}

// ==============================================================================
// ORDERING AND MATCHING
// ==============================================================================

#[tokio::test]
async fn test_find_compatible_orders_by_priority_then_creation() {
    let ctx = WaitlistTestContext::new();
    let first_five = ctx.enqueue_for(20, 5).await;
    let eight = ctx.enqueue_for(21, 8).await;
    let second_five = ctx.enqueue_for(22, 5).await;
    let three = ctx.enqueue_for(23, 3).await;

    let ordered: Vec<Uuid> = ctx
        .engine
        .find_compatible(&ctx.cleaning_offer())
        .await
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();

    assert_eq!(ordered, vec![eight.id, first_five.id, second_five.id, three.id]);
}

#[tokio::test]
async fn test_find_compatible_scopes_practitioner_date_and_procedure() {
    let ctx = WaitlistTestContext::new();
    let exact = ctx.enqueue_for(20, 5).await;
    let any_practitioner = ctx
        .enqueue(EnqueueRequest {
            practitioner_id: Some(test_id(OTHER_PRACTITIONER)),
            accepts_any_practitioner: true,
            ..EnqueueRequest::new(test_id(21), ProcedureType::Cleaning)
        })
        .await;
    let unscoped = ctx
        .enqueue(EnqueueRequest::new(test_id(22), ProcedureType::Cleaning))
        .await;
    let _other_practitioner = ctx
        .enqueue(EnqueueRequest {
            practitioner_id: Some(test_id(OTHER_PRACTITIONER)),
            ..EnqueueRequest::new(test_id(23), ProcedureType::Cleaning)
        })
        .await;
    let _other_date = ctx
        .enqueue(EnqueueRequest {
            practitioner_id: Some(test_id(PRACTITIONER)),
            preferred_date: Some(date(2025, 3, 11)),
            ..EnqueueRequest::new(test_id(24), ProcedureType::Cleaning)
        })
        .await;
    let _other_procedure = ctx
        .enqueue(EnqueueRequest {
            practitioner_id: Some(test_id(PRACTITIONER)),
            ..EnqueueRequest::new(test_id(25), ProcedureType::Extraction)
        })
        .await;

    let found: Vec<Uuid> = ctx
        .engine
        .find_compatible(&ctx.cleaning_offer())
        .await
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();

    assert_eq!(found, vec![exact.id, any_practitioner.id, unscoped.id]);
}

#[tokio::test]
async fn test_time_preferences_filter_known_windows() {
    let ctx = WaitlistTestContext::new();
    let morning = ctx
        .enqueue(EnqueueRequest {
            practitioner_id: Some(test_id(PRACTITIONER)),
            preferred_period: Some(PeriodOfDay::Morning),
            ..EnqueueRequest::new(test_id(20), ProcedureType::Cleaning)
        })
        .await;
    let window = ctx
        .enqueue(EnqueueRequest {
            practitioner_id: Some(test_id(PRACTITIONER)),
            preferred_start_time: Some(time(13, 0)),
            preferred_end_time: Some(time(16, 0)),
            ..EnqueueRequest::new(test_id(21), ProcedureType::Cleaning)
        })
        .await;
    let anytime = ctx
        .enqueue(EnqueueRequest {
            practitioner_id: Some(test_id(PRACTITIONER)),
            preferred_period: Some(PeriodOfDay::Evening),
            accepts_any_time: true,
            ..EnqueueRequest::new(test_id(22), ProcedureType::Cleaning)
        })
        .await;

    let afternoon = ctx.cleaning_offer().with_window(time(14, 0), time(14, 30));
    let ids: Vec<Uuid> = ctx
        .engine
        .find_compatible(&afternoon)
        .await
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec![window.id, anytime.id]);

    let unknown_window = ctx.engine.find_compatible(&ctx.cleaning_offer()).await.unwrap();
    assert_eq!(unknown_window.len(), 3);
    assert_eq!(unknown_window[0].id, morning.id);
}

// ==============================================================================
// ENQUEUE VALIDATION
// ==============================================================================

#[tokio::test]
async fn test_enqueue_defaults_to_mid_priority() {
    let ctx = WaitlistTestContext::new();
    let entry = ctx
        .enqueue(EnqueueRequest::new(test_id(20), ProcedureType::Consultation))
        .await;

    assert_eq!(entry.priority, 5);
    assert_eq!(entry.status, WaitlistStatus::Waiting);
    assert_eq!(entry.created_by, test_id(STAFF));
    assert_eq!(entry.contact_attempts, 0);
}

#[tokio::test]
async fn test_enqueue_rejects_priority_outside_range() {
    let ctx = WaitlistTestContext::new();

    for priority in [0, 11] {
        let result = ctx
            .engine
            .enqueue(
                EnqueueRequest {
                    priority: Some(priority),
                    ..EnqueueRequest::new(test_id(20), ProcedureType::Cleaning)
                },
                test_id(STAFF),
            )
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_matches!(err, WaitlistError::PriorityOutOfRange(p) if p == priority);
    }
    assert!(ctx.store.is_empty());
}

#[tokio::test]
async fn test_enqueue_rejects_bad_preferences() {
    let ctx = WaitlistTestContext::new();

    let inverted = ctx
        .engine
        .enqueue(
            EnqueueRequest {
                preferred_start_time: Some(time(15, 0)),
                preferred_end_time: Some(time(14, 0)),
                ..EnqueueRequest::new(test_id(20), ProcedureType::Cleaning)
            },
            test_id(STAFF),
        )
        .await;
    assert_matches!(inverted, Err(WaitlistError::InvalidPreferredWindow(_)));

    let half_open = ctx
        .engine
        .enqueue(
            EnqueueRequest {
                preferred_start_time: Some(time(15, 0)),
                ..EnqueueRequest::new(test_id(20), ProcedureType::Cleaning)
            },
            test_id(STAFF),
        )
        .await;
    assert_matches!(half_open, Err(WaitlistError::InvalidPreferredWindow(_)));

    let past = ctx
        .engine
        .enqueue(
            EnqueueRequest {
                preferred_date: Some(date(2025, 3, 1)),
                ..EnqueueRequest::new(test_id(20), ProcedureType::Cleaning)
            },
            test_id(STAFF),
        )
        .await;
    assert_matches!(past, Err(WaitlistError::PreferredDateInPast { .. }));
}

#[tokio::test]
async fn test_enqueue_checks_directories() {
    let ctx = WaitlistTestContext::new();

    let unknown_patient = ctx
        .engine
        .enqueue(
            EnqueueRequest::new(test_id(99), ProcedureType::Cleaning),
            test_id(STAFF),
        )
        .await
        .unwrap_err();
    assert_matches!(unknown_patient, WaitlistError::PatientNotFound(_));
    assert_eq!(unknown_patient.kind(), ErrorKind::NotFound);

    let unknown_practitioner = ctx
        .engine
        .enqueue(
            EnqueueRequest {
                practitioner_id: Some(test_id(77)),
                ..EnqueueRequest::new(test_id(20), ProcedureType::Cleaning)
            },
            test_id(STAFF),
        )
        .await;
    assert_matches!(unknown_practitioner, Err(WaitlistError::PractitionerNotFound(_)));

    let inactive = ctx
        .engine
        .enqueue(
            EnqueueRequest {
                practitioner_id: Some(test_id(INACTIVE_PRACTITIONER)),
                ..EnqueueRequest::new(test_id(20), ProcedureType::Cleaning)
            },
            test_id(STAFF),
        )
        .await;
    assert_matches!(inactive, Err(WaitlistError::PractitionerInactive(_)));
}

#[tokio::test]
async fn test_duplicate_active_entry_is_rejected_per_practitioner_scope() {
    let ctx = WaitlistTestContext::new();
    let first = ctx.enqueue_for(20, 5).await;

    let duplicate = ctx
        .engine
        .enqueue(
            EnqueueRequest {
                practitioner_id: Some(test_id(PRACTITIONER)),
                ..EnqueueRequest::new(test_id(20), ProcedureType::Extraction)
            },
            test_id(STAFF),
        )
        .await
        .unwrap_err();
    assert_eq!(duplicate.kind(), ErrorKind::RuleViolation);
    assert_matches!(duplicate, WaitlistError::DuplicateActiveEntry { .. });

    // Other practitioner and the global scope are separate queues.
    ctx.enqueue(EnqueueRequest {
        practitioner_id: Some(test_id(OTHER_PRACTITIONER)),
        ..EnqueueRequest::new(test_id(20), ProcedureType::Cleaning)
    })
    .await;
    ctx.enqueue(EnqueueRequest::new(test_id(20), ProcedureType::Cleaning))
        .await;

    // Once the first entry leaves the active set the scope is free again.
    ctx.engine.cancel(first.id, test_id(STAFF)).await.unwrap();
    ctx.enqueue_for(20, 7).await;
}

#[tokio::test]
async fn test_concurrent_enqueues_admit_one_entry() {
    let ctx = WaitlistTestContext::new();

    let attempts = (0..8).map(|_| {
        let engine = Arc::clone(&ctx.engine);
        tokio::spawn(async move {
            engine
                .enqueue(
                    EnqueueRequest {
                        practitioner_id: Some(test_id(PRACTITIONER)),
                        ..EnqueueRequest::new(test_id(20), ProcedureType::Cleaning)
                    },
                    test_id(STAFF),
                )
                .await
        })
    });
    let results = futures::future::join_all(attempts).await;

    let admitted = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(ctx.store.len(), 1);
}

// ==============================================================================
// PROMOTION AND NOTIFICATION
// ==============================================================================

#[tokio::test]
async fn test_promote_notifies_exactly_one_entry() {
    let ctx = WaitlistTestContext::new();
    let head = ctx.enqueue_for(20, 5).await;
    ctx.enqueue_for(21, 5).await;
    ctx.enqueue_for(22, 5).await;

    let outcome = ctx
        .engine
        .promote(&ctx.cleaning_offer(), test_id(STAFF))
        .await
        .unwrap();

    assert_eq!(outcome.notified_entry(), Some(head.id));
    let notified: Vec<_> = ctx
        .engine
        .find_compatible(&ctx.cleaning_offer())
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.status == WaitlistStatus::Notified)
        .collect();
    assert_eq!(notified.len(), 1);
    assert!(notified[0].notified);
    assert!(notified[0].notified_at.is_some());
    assert_eq!(ctx.notifier.sent().len(), 1);
    assert_eq!(ctx.notifier.sent_to(test_id(20)), 1);
}

#[tokio::test]
async fn test_promote_waits_for_notified_head() {
    let ctx = WaitlistTestContext::new();
    let head = ctx.enqueue_for(20, 9).await;
    ctx.enqueue_for(21, 5).await;

    ctx.engine
        .promote(&ctx.cleaning_offer(), test_id(STAFF))
        .await
        .unwrap();
    let second = ctx
        .engine
        .promote(&ctx.cleaning_offer(), test_id(STAFF))
        .await
        .unwrap();

    assert_eq!(second, PromotionOutcome::HeadAwaitingResponse { entry_id: head.id });
    assert_eq!(ctx.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_promote_without_candidates() {
    let ctx = WaitlistTestContext::new();
    let outcome = ctx
        .engine
        .promote(&ctx.cleaning_offer(), test_id(STAFF))
        .await
        .unwrap();
    assert_eq!(outcome, PromotionOutcome::NoCandidate);
}

#[tokio::test]
async fn test_notify_is_only_legal_from_waiting() {
    let ctx = WaitlistTestContext::new();
    let entry = ctx.enqueue_for(20, 5).await;
    let offer = ctx.cleaning_offer();

    ctx.engine.notify(entry.id, &offer, test_id(STAFF)).await.unwrap();
    let again = ctx.engine.notify(entry.id, &offer, test_id(STAFF)).await;

    assert_matches!(
        again,
        Err(WaitlistError::InvalidTransition {
            from: WaitlistStatus::Notified,
            to: WaitlistStatus::Notified
        })
    );
}

#[tokio::test]
async fn test_failed_dispatch_counts_attempts_until_exhausted() {
    let ctx = WaitlistTestContext::with_policy(SchedulingPolicy {
        max_contact_attempts: 2,
        ..SchedulingPolicy::default()
    });
    let entry = ctx.enqueue_for(20, 5).await;
    let offer = ctx.cleaning_offer();
    ctx.notifier.set_failing(true);

    let first = ctx.engine.promote(&offer, test_id(STAFF)).await.unwrap();
    assert_eq!(
        first,
        PromotionOutcome::Attempted(NotifyOutcome::DispatchFailed {
            entry_id: entry.id,
            attempts: 1,
            exhausted: false
        })
    );
    let stored = ctx.engine.get(entry.id).await.unwrap();
    assert_eq!(stored.status, WaitlistStatus::Waiting);
    assert_eq!(stored.pending_offer, Some(offer.clone()));
    assert!(stored.last_attempt_at.is_some());

    ctx.engine.promote(&offer, test_id(STAFF)).await.unwrap();
    let stored = ctx.engine.get(entry.id).await.unwrap();
    assert_eq!(stored.contact_attempts, 2);
    assert!(stored.notifications_exhausted);

    // Automatic paths skip the exhausted entry.
    let third = ctx.engine.promote(&offer, test_id(STAFF)).await.unwrap();
    assert_eq!(third, PromotionOutcome::NoCandidate);
    assert!(ctx.engine.retry_pending_notifications().await.unwrap().is_empty());

    // Staff can still reach out manually.
    ctx.notifier.set_failing(false);
    let manual = ctx.engine.notify(entry.id, &offer, test_id(STAFF)).await.unwrap();
    assert_eq!(manual, NotifyOutcome::Notified { entry_id: entry.id });
    assert_eq!(ctx.engine.get(entry.id).await.unwrap().pending_offer, None);
}

#[tokio::test]
async fn test_mocked_dispatch_failure_is_captured() {
    let mut dispatcher = MockDispatcher::new();
    dispatcher
        .expect_send()
        .times(1)
        .returning(|_, _| Err(anyhow!("sms gateway timeout")));
    let ctx = WaitlistTestContext::with_dispatcher(move |_| {
        Arc::new(dispatcher) as Arc<dyn NotificationDispatcher>
    });
    let entry = ctx.enqueue_for(20, 5).await;

    let outcome = ctx
        .engine
        .notify(entry.id, &ctx.cleaning_offer(), test_id(STAFF))
        .await;

    assert_matches!(
        outcome,
        Ok(NotifyOutcome::DispatchFailed { attempts: 1, exhausted: false, .. })
    );
}

#[tokio::test]
async fn test_mocked_dispatch_receives_slot_details() {
    let mut dispatcher = MockDispatcher::new();
    dispatcher
        .expect_send()
        .withf(|patient_id, message| {
            *patient_id == test_id(20)
                && matches!(
                    message,
                    NotificationMessage::SlotAvailable {
                        start_time: Some(start),
                        procedure_type: ProcedureType::Cleaning,
                        ..
                    } if *start == time(9, 0)
                )
        })
        .times(1)
        .returning(|_, _| Ok(()));
    let ctx = WaitlistTestContext::with_dispatcher(move |_| {
        Arc::new(dispatcher) as Arc<dyn NotificationDispatcher>
    });
    ctx.enqueue_for(20, 5).await;

    let offer = ctx.cleaning_offer().with_window(time(9, 0), time(9, 30));
    let outcome = ctx.engine.promote(&offer, test_id(STAFF)).await.unwrap();

    assert!(outcome.notified_entry().is_some());
}

#[tokio::test]
async fn test_entry_changed_during_dispatch_is_superseded() {
    let ctx = WaitlistTestContext::with_dispatcher(|store| {
        Arc::new(CancellingDispatcher {
            store: Arc::clone(store),
        }) as Arc<dyn NotificationDispatcher>
    });
    let entry = ctx.enqueue_for(20, 5).await;

    let outcome = ctx
        .engine
        .notify(entry.id, &ctx.cleaning_offer(), test_id(STAFF))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        NotifyOutcome::Superseded {
            entry_id: entry.id,
            status: WaitlistStatus::Cancelled
        }
    );
    assert_eq!(ctx.engine.get(entry.id).await.unwrap().contact_attempts, 0);
}

// ==============================================================================
// CONVERSION, CANCELLATION, PRIORITY
// ==============================================================================

#[tokio::test]
async fn test_convert_links_appointment() {
    let ctx = WaitlistTestContext::new();
    let entry = ctx.enqueue_for(20, 5).await;
    ctx.engine
        .promote(&ctx.cleaning_offer(), test_id(STAFF))
        .await
        .unwrap();
    let appointment_id = Uuid::new_v4();

    let converted = ctx
        .engine
        .convert(entry.id, appointment_id, test_id(20))
        .await
        .unwrap();

    assert_eq!(converted.status, WaitlistStatus::Converted);
    assert_eq!(converted.appointment_id, Some(appointment_id));
    assert!(converted.converted_at.is_some());
    assert_eq!(converted.updated_by, test_id(20));
}

#[tokio::test]
async fn test_revert_conversion_restores_previous_state() {
    let ctx = WaitlistTestContext::new();
    let notified = ctx.enqueue_for(20, 5).await;
    let waiting = ctx.enqueue_for(21, 3).await;
    ctx.engine
        .promote(&ctx.cleaning_offer(), test_id(STAFF))
        .await
        .unwrap();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    ctx.engine.convert(notified.id, first, test_id(20)).await.unwrap();
    ctx.engine.convert(waiting.id, second, test_id(21)).await.unwrap();

    assert_matches!(
        ctx.engine.revert_conversion(notified.id, second, test_id(STAFF)).await,
        Err(WaitlistError::EntryNotActive { .. })
    );

    let reopened = ctx
        .engine
        .revert_conversion(notified.id, first, test_id(STAFF))
        .await
        .unwrap();
    assert_eq!(reopened.status, WaitlistStatus::Notified);
    assert!(reopened.appointment_id.is_none());
    assert!(reopened.converted_at.is_none());

    let reopened = ctx
        .engine
        .revert_conversion(waiting.id, second, test_id(STAFF))
        .await
        .unwrap();
    assert_eq!(reopened.status, WaitlistStatus::Waiting);
    assert_eq!(ctx.engine.position(waiting.id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_closed_entries_cannot_convert_or_cancel() {
    let ctx = WaitlistTestContext::new();
    let entry = ctx.enqueue_for(20, 5).await;
    ctx.engine.cancel(entry.id, test_id(STAFF)).await.unwrap();

    let convert = ctx
        .engine
        .convert(entry.id, Uuid::new_v4(), test_id(STAFF))
        .await
        .unwrap_err();
    assert_eq!(convert.kind(), ErrorKind::RuleViolation);
    assert_matches!(
        convert,
        WaitlistError::InvalidTransition {
            from: WaitlistStatus::Cancelled,
            to: WaitlistStatus::Converted
        }
    );
    assert_matches!(
        ctx.engine.cancel(entry.id, test_id(STAFF)).await,
        Err(WaitlistError::InvalidTransition { .. })
    );
    assert_matches!(
        ctx.engine.ensure_convertible(entry.id, test_id(20)).await,
        Err(WaitlistError::EntryNotActive { .. })
    );
}

#[tokio::test]
async fn test_ensure_convertible_checks_owner() {
    let ctx = WaitlistTestContext::new();
    let entry = ctx.enqueue_for(20, 5).await;

    assert!(ctx.engine.ensure_convertible(entry.id, test_id(20)).await.is_ok());
    assert_matches!(
        ctx.engine.ensure_convertible(entry.id, test_id(21)).await,
        Err(WaitlistError::PatientMismatch { .. })
    );
    assert_matches!(
        ctx.engine.ensure_convertible(Uuid::new_v4(), test_id(20)).await,
        Err(WaitlistError::EntryNotFound(_))
    );
}

#[tokio::test]
async fn test_find_patient_match_ignores_other_patients() {
    let ctx = WaitlistTestContext::new();
    ctx.enqueue_for(20, 9).await;
    let own = ctx.enqueue_for(21, 1).await;

    let matched = ctx
        .engine
        .find_patient_match(test_id(21), &ctx.cleaning_offer())
        .await
        .unwrap();
    assert_eq!(matched.map(|e| e.id), Some(own.id));

    let none = ctx
        .engine
        .find_patient_match(test_id(22), &ctx.cleaning_offer())
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_update_priority_reorders_queue() {
    let ctx = WaitlistTestContext::new();
    let first = ctx.enqueue_for(20, 5).await;
    let second = ctx.enqueue_for(21, 5).await;

    ctx.engine
        .update_priority(second.id, 9, test_id(STAFF))
        .await
        .unwrap();

    assert_eq!(ctx.engine.position(second.id).await.unwrap(), 1);
    assert_eq!(ctx.engine.position(first.id).await.unwrap(), 2);
    assert_matches!(
        ctx.engine.update_priority(first.id, 42, test_id(STAFF)).await,
        Err(WaitlistError::PriorityOutOfRange(42))
    );
}

// ==============================================================================
// POSITION AND EXPIRY
// ==============================================================================

#[tokio::test]
async fn test_position_is_one_based_and_zero_when_inactive() {
    let ctx = WaitlistTestContext::new();
    let a = ctx.enqueue_for(20, 5).await;
    let b = ctx.enqueue_for(21, 8).await;
    let global = ctx
        .enqueue(EnqueueRequest {
            priority: Some(1),
            ..EnqueueRequest::new(test_id(22), ProcedureType::Cleaning)
        })
        .await;
    let elsewhere = ctx
        .enqueue(EnqueueRequest {
            practitioner_id: Some(test_id(OTHER_PRACTITIONER)),
            priority: Some(10),
            ..EnqueueRequest::new(test_id(23), ProcedureType::Cleaning)
        })
        .await;

    assert_eq!(ctx.engine.position(b.id).await.unwrap(), 1);
    assert_eq!(ctx.engine.position(a.id).await.unwrap(), 2);
    // Global entries rank against every active entry.
    assert_eq!(ctx.engine.position(global.id).await.unwrap(), 4);
    assert_eq!(ctx.engine.position(elsewhere.id).await.unwrap(), 1);

    ctx.engine.cancel(b.id, test_id(STAFF)).await.unwrap();
    assert_eq!(ctx.engine.position(b.id).await.unwrap(), 0);
    assert_eq!(ctx.engine.position(a.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_expire_overdue_is_idempotent() {
    let ctx = WaitlistTestContext::new();
    let dated = ctx
        .enqueue(EnqueueRequest {
            preferred_date: Some(date(2025, 3, 5)),
            ..EnqueueRequest::new(test_id(20), ProcedureType::Cleaning)
        })
        .await;
    let today_entry = ctx
        .enqueue(EnqueueRequest {
            practitioner_id: Some(test_id(PRACTITIONER)),
            preferred_date: Some(date(2025, 3, 7)),
            ..EnqueueRequest::new(test_id(21), ProcedureType::Cleaning)
        })
        .await;
    let undated = ctx.enqueue_for(22, 5).await;

    let today = date(2025, 3, 7);
    let first = ctx.engine.expire_overdue(today).await.unwrap();
    let second = ctx.engine.expire_overdue(today).await.unwrap();

    assert_eq!(first, vec![dated.id]);
    assert!(second.is_empty());
    assert_eq!(
        ctx.engine.get(dated.id).await.unwrap().status,
        WaitlistStatus::Expired
    );
    assert_eq!(
        ctx.engine.get(today_entry.id).await.unwrap().status,
        WaitlistStatus::Waiting
    );
    assert_eq!(
        ctx.engine.get(undated.id).await.unwrap().status,
        WaitlistStatus::Waiting
    );
}
