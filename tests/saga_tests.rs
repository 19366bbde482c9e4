// Copyright 2025 Cowboy AI, LLC.

//! Saga orchestration through the command topic

mod common;

use pretty_assertions::assert_eq;
use std::sync::Arc;

use realm_substrate::message::topics::COMMAND_TOPIC_SAGA;
use realm_substrate::message::InMemoryPublisher;
use realm_substrate::saga::model::{
    AwardAssetPayload, AwardExperiencePayload, AwardMesosPayload, ExperienceDistribution,
    ItemPayload,
};
use realm_substrate::saga::{
    ActionPayload, CommandDispatcher, InMemorySagaStore, Saga, SagaCommandBody, SagaCoordinator,
    SagaStatus, SagaType, StepStatus,
};

fn coordinator() -> (SagaCoordinator, InMemoryPublisher) {
    let (emitter, publisher) = common::emitter();
    let coordinator = SagaCoordinator::new(
        Arc::new(InMemorySagaStore::new()),
        Arc::new(CommandDispatcher::new(emitter)),
    );
    (coordinator, publisher)
}

fn quest_reward() -> Saga {
    Saga::builder()
        .saga_type(SagaType::QuestReward)
        .initiated_by("QUEST_2000")
        .step(
            "experience",
            ActionPayload::AwardExperience(AwardExperiencePayload {
                character_id: 1,
                world_id: 0,
                channel_id: 1,
                distributions: vec![ExperienceDistribution {
                    experience_type: "QUEST".to_string(),
                    amount: 500,
                    attr1: 0,
                }],
            }),
        )
        .step(
            "mesos",
            ActionPayload::AwardMesos(AwardMesosPayload {
                character_id: 1,
                world_id: 0,
                channel_id: 1,
                actor_id: 0,
                actor_type: "SYSTEM".to_string(),
                amount: 1000,
            }),
        )
        .step(
            "asset",
            ActionPayload::AwardAsset(AwardAssetPayload {
                character_id: 1,
                item: ItemPayload {
                    template_id: 2000000,
                    quantity: 5,
                    period: 0,
                    expiration: None,
                },
            }),
        )
        .build()
        .unwrap()
}

fn commands(publisher: &InMemoryPublisher) -> Vec<(String, bool)> {
    publisher
        .envelopes::<SagaCommandBody>(COMMAND_TOPIC_SAGA)
        .unwrap()
        .into_iter()
        .map(|e| (e.body.step_id, e.body.compensating))
        .collect()
}

#[tokio::test]
async fn failed_step_compensates_completed_steps_latest_first() {
    let (sagas, publisher) = coordinator();
    let ctx = common::context();
    let tx = sagas.start(&ctx, quest_reward()).await.unwrap().transaction_id;

    sagas.step_status(&ctx, tx, "experience", StepStatus::Completed).await.unwrap();
    sagas.step_status(&ctx, tx, "mesos", StepStatus::Completed).await.unwrap();
    let saga = sagas.step_status(&ctx, tx, "asset", StepStatus::Failed).await.unwrap();

    assert_eq!(saga.status, SagaStatus::Failed);
    assert_eq!(
        commands(&publisher),
        vec![
            ("experience".to_string(), false),
            ("mesos".to_string(), false),
            ("asset".to_string(), false),
            ("mesos".to_string(), true),
            ("experience".to_string(), true),
        ]
    );

    let reversal = publisher.envelopes::<SagaCommandBody>(COMMAND_TOPIC_SAGA).unwrap();
    assert_eq!(reversal[3].body.payload["amount"], -1000);
    assert!(reversal.iter().all(|e| e.key == tx.to_string()));
}

#[tokio::test]
async fn completed_saga_ignores_late_reports() {
    let (sagas, publisher) = coordinator();
    let ctx = common::context();
    let tx = sagas.start(&ctx, quest_reward()).await.unwrap().transaction_id;

    for step in ["experience", "mesos", "asset"] {
        sagas.step_status(&ctx, tx, step, StepStatus::Completed).await.unwrap();
    }
    assert_eq!(sagas.get(&ctx, tx).await.unwrap().status, SagaStatus::Completed);

    let dispatched = publisher.count();
    let saga = sagas.step_status(&ctx, tx, "asset", StepStatus::Failed).await.unwrap();
    assert_eq!(saga.status, SagaStatus::Completed);
    assert_eq!(publisher.count(), dispatched);
}

#[tokio::test]
async fn sagas_are_scoped_to_their_tenant() {
    let (sagas, _) = coordinator();
    let ours = common::context();
    let theirs = common::context();
    let tx = sagas.start(&ours, quest_reward()).await.unwrap().transaction_id;

    let err = sagas.get(&theirs, tx).await.unwrap_err();
    assert!(err.is_not_found());
}
