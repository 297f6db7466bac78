use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use leadflow_core::config::SweepConfig;
use leadflow_core::domain::lead::{LeadId, LeadRecord, LeadStatus, SessionId};
use leadflow_core::domain::snapshot::CrmFieldMap;
use leadflow_core::domain::transcript::{Transcript, Turn};
use leadflow_db::repositories::{
    InMemoryLeadRepository, InMemoryTranscriptRepository, LeadRepository, TranscriptRepository,
};
use leadflow_engine::{CreationOutcome, CrmClient, CrmError, ReconcileEngine, UpdateOutcome};

struct FakeLlm {
    extraction_reply: String,
    summary_reply: String,
}

#[async_trait]
impl leadflow_agent::LlmClient for FakeLlm {
    async fn complete(&self, _system: Option<&str>, prompt: &str) -> Result<String> {
        if prompt.starts_with("Summarize") {
            Ok(self.summary_reply.clone())
        } else {
            Ok(self.extraction_reply.clone())
        }
    }

    async fn converse(&self, _system: &str, _turns: &[Turn]) -> Result<String> {
        Ok(self.summary_reply.clone())
    }
}

#[derive(Default)]
struct FakeCrm {
    create_results: Mutex<VecDeque<Result<LeadId, CrmError>>>,
    update_results: Mutex<VecDeque<Result<(), CrmError>>>,
    create_calls: Mutex<Vec<CrmFieldMap>>,
    update_calls: Mutex<Vec<(LeadId, CrmFieldMap)>>,
    leads_by_email: Mutex<HashMap<String, LeadId>>,
}

impl FakeCrm {
    async fn script_create(&self, result: Result<LeadId, CrmError>) {
        self.create_results.lock().await.push_back(result);
    }

    async fn script_update(&self, result: Result<(), CrmError>) {
        self.update_results.lock().await.push_back(result);
    }

    async fn known_email(&self, email: &str, lead_id: &str) {
        self.leads_by_email
            .lock()
            .await
            .insert(email.to_string(), LeadId(lead_id.to_string()));
    }
}

#[async_trait]
impl CrmClient for FakeCrm {
    async fn create_lead(&self, fields: &CrmFieldMap) -> Result<LeadId, CrmError> {
        self.create_calls.lock().await.push(fields.clone());
        self.create_results
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(CrmError::Transport("no scripted result".to_string())))
    }

    async fn update_lead(&self, lead_id: &LeadId, fields: &CrmFieldMap) -> Result<(), CrmError> {
        self.update_calls.lock().await.push((lead_id.clone(), fields.clone()));
        self.update_results.lock().await.pop_front().unwrap_or(Ok(()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<LeadId>, CrmError> {
        Ok(self.leads_by_email.lock().await.get(email).cloned())
    }

    async fn find_by_phone(&self, _phone: &str) -> Result<Option<LeadId>, CrmError> {
        Ok(None)
    }
}

const JANE_PAIRS: &str = "Name: Jane Doe, Age: 30, Email: jane@example.com, \
    Country Code: +1, Phone: 555 0100, Nationality: None, Current Location: None";

fn test_config() -> SweepConfig {
    SweepConfig { crm_retry_backoff_secs: 0, ..SweepConfig::default() }
}

fn jane_llm() -> Arc<FakeLlm> {
    Arc::new(FakeLlm {
        extraction_reply: JANE_PAIRS.to_string(),
        summary_reply: "Jane asked about moving abroad.".to_string(),
    })
}

async fn seed_session(
    leads: &InMemoryLeadRepository,
    transcripts: &InMemoryTranscriptRepository,
    session: &str,
) {
    let mut transcript = Transcript::new(SessionId(session.to_string()));
    transcript.push(Turn::user("hi, I am Jane Doe, jane@example.com, +1 555 0100"));
    transcript.push(Turn::assistant("nice to meet you"));
    transcripts.save(transcript).await.expect("transcript save should succeed");

    leads
        .save(LeadRecord::empty(SessionId(session.to_string())))
        .await
        .expect("lead save should succeed");
}

fn engine(
    leads: Arc<InMemoryLeadRepository>,
    transcripts: Arc<InMemoryTranscriptRepository>,
    llm: Arc<FakeLlm>,
    crm: Arc<FakeCrm>,
) -> ReconcileEngine {
    ReconcileEngine::new(leads, transcripts, llm, crm, test_config())
}

#[tokio::test]
async fn qualified_session_creates_a_lead() {
    let leads = Arc::new(InMemoryLeadRepository::default());
    let transcripts = Arc::new(InMemoryTranscriptRepository::default());
    let crm = Arc::new(FakeCrm::default());
    crm.script_create(Ok(LeadId("00Q1".to_string()))).await;

    seed_session(&leads, &transcripts, "s-1").await;
    let engine = engine(Arc::clone(&leads), Arc::clone(&transcripts), jane_llm(), Arc::clone(&crm));

    let report = engine.run_creation_sweep().await.expect("sweep should succeed");
    assert_eq!(report.scanned, 1);
    assert_eq!(report.created, 1);

    let record = leads
        .find(&SessionId("s-1".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    assert_eq!(record.lead_id, Some(LeadId("00Q1".to_string())));
    assert_eq!(record.status, LeadStatus::Created);
    assert_eq!(record.creation_attempts, 1);
    assert!(record.summary.is_some());
    assert_eq!(record.captured_inputs.len(), 1);
    assert!(record.lease_until.is_none(), "lease should be released after the pass");

    let creates = crm.create_calls.lock().await;
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].get("FirstName").map(String::as_str), Some("Jane"));
    assert_eq!(creates[0].get("LastName").map(String::as_str), Some("Doe"));
    assert_eq!(creates[0].get("Description").map(String::as_str), Some("Jane asked about moving abroad."));
    assert_eq!(creates[0].get("LeadSource").map(String::as_str), Some("Our Website"));
}

#[tokio::test]
async fn duplicate_email_merges_into_the_existing_lead() {
    let leads = Arc::new(InMemoryLeadRepository::default());
    let transcripts = Arc::new(InMemoryTranscriptRepository::default());
    let crm = Arc::new(FakeCrm::default());
    crm.script_create(Err(CrmError::DuplicateEmail)).await;
    crm.known_email("jane@example.com", "00Q7").await;

    // A sibling session already linked to the same lead contributes its
    // summary to the merged description.
    let mut sibling = LeadRecord::empty(SessionId("s-old".to_string()));
    sibling.lead_id = Some(LeadId("00Q7".to_string()));
    sibling.summary = Some("Earlier conversation about student visas.".to_string());
    leads.save(sibling).await.expect("sibling save should succeed");

    seed_session(&leads, &transcripts, "s-2").await;
    let engine = engine(Arc::clone(&leads), Arc::clone(&transcripts), jane_llm(), Arc::clone(&crm));

    let record = leads
        .find(&SessionId("s-2".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    let outcome = engine.reconcile_creation(&record).await.expect("pass should succeed");
    assert_eq!(outcome, CreationOutcome::MergedDuplicate { lead_id: LeadId("00Q7".to_string()) });

    let record = leads
        .find(&SessionId("s-2".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    assert_eq!(record.lead_id, Some(LeadId("00Q7".to_string())));
    assert_eq!(record.status, LeadStatus::Created);

    let updates = crm.update_calls.lock().await;
    assert_eq!(updates.len(), 1, "exactly one CRM update for the merge");
    assert_eq!(updates[0].0, LeadId("00Q7".to_string()));
    let description = updates[0].1.get("Description").expect("merged description");
    assert!(description.starts_with("Jane asked about moving abroad."));
    assert!(description.contains("Earlier conversation about student visas."));
}

#[tokio::test]
async fn unqualified_session_never_reaches_the_crm() {
    let leads = Arc::new(InMemoryLeadRepository::default());
    let transcripts = Arc::new(InMemoryTranscriptRepository::default());
    let crm = Arc::new(FakeCrm::default());
    let llm = Arc::new(FakeLlm {
        extraction_reply: "Name: Jane Doe, Email: None, Phone: None".to_string(),
        summary_reply: "unused".to_string(),
    });

    seed_session(&leads, &transcripts, "s-3").await;
    let engine = engine(Arc::clone(&leads), Arc::clone(&transcripts), llm, Arc::clone(&crm));

    let record = leads
        .find(&SessionId("s-3".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    let outcome = engine.reconcile_creation(&record).await.expect("pass should succeed");
    assert_eq!(outcome, CreationOutcome::SkippedNoContactInfo);

    // The pass is counted so a session that never qualifies ages out at the
    // attempt cap instead of being re-extracted on every sweep.
    let record = leads
        .find(&SessionId("s-3".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    assert_eq!(record.creation_attempts, 1);
    assert_eq!(record.status, LeadStatus::NotQualified);
    assert_eq!(record.lead_id, None);
    assert!(crm.create_calls.lock().await.is_empty());
    assert!(crm.update_calls.lock().await.is_empty());
}

#[tokio::test]
async fn capped_record_is_not_swept() {
    let leads = Arc::new(InMemoryLeadRepository::default());
    let transcripts = Arc::new(InMemoryTranscriptRepository::default());
    let crm = Arc::new(FakeCrm::default());

    seed_session(&leads, &transcripts, "s-4").await;
    let mut record = leads
        .find(&SessionId("s-4".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    record.creation_attempts = 4;
    record.status = LeadStatus::Failed;
    leads.save(record).await.expect("save should succeed");

    let engine = engine(Arc::clone(&leads), Arc::clone(&transcripts), jane_llm(), Arc::clone(&crm));
    let report = engine.run_creation_sweep().await.expect("sweep should succeed");
    assert_eq!(report.scanned, 0);
    assert!(crm.create_calls.lock().await.is_empty());
}

#[tokio::test]
async fn transient_rejection_is_retried_then_succeeds() {
    let leads = Arc::new(InMemoryLeadRepository::default());
    let transcripts = Arc::new(InMemoryTranscriptRepository::default());
    let crm = Arc::new(FakeCrm::default());
    crm.script_create(Err(CrmError::MalformedRequest("flaky".to_string()))).await;
    crm.script_create(Ok(LeadId("00Q5".to_string()))).await;

    seed_session(&leads, &transcripts, "s-5").await;
    let engine = engine(Arc::clone(&leads), Arc::clone(&transcripts), jane_llm(), Arc::clone(&crm));

    let record = leads
        .find(&SessionId("s-5".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    let outcome = engine.reconcile_creation(&record).await.expect("pass should succeed");
    assert_eq!(outcome, CreationOutcome::Created { lead_id: LeadId("00Q5".to_string()) });

    assert_eq!(crm.create_calls.lock().await.len(), 2);

    // One engine pass, regardless of inner retries.
    let record = leads
        .find(&SessionId("s-5".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    assert_eq!(record.creation_attempts, 1);
}

#[tokio::test]
async fn failed_create_leaves_record_unlinked_and_counts_the_pass() {
    let leads = Arc::new(InMemoryLeadRepository::default());
    let transcripts = Arc::new(InMemoryTranscriptRepository::default());
    let crm = Arc::new(FakeCrm::default());
    for _ in 0..3 {
        crm.script_create(Err(CrmError::MalformedRequest("bad field".to_string()))).await;
    }

    seed_session(&leads, &transcripts, "s-6").await;
    let engine = engine(Arc::clone(&leads), Arc::clone(&transcripts), jane_llm(), Arc::clone(&crm));

    let record = leads
        .find(&SessionId("s-6".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    let outcome = engine.reconcile_creation(&record).await.expect("pass should succeed");
    assert!(matches!(outcome, CreationOutcome::Failed { .. }));

    let record = leads
        .find(&SessionId("s-6".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    assert_eq!(record.lead_id, None);
    assert_eq!(record.status, LeadStatus::Failed);
    assert_eq!(record.creation_attempts, 1);
    assert!(record.status_message.is_some());
}

async fn seed_linked_session(
    leads: &InMemoryLeadRepository,
    transcripts: &InMemoryTranscriptRepository,
    session: &str,
    captured: Vec<String>,
) {
    let mut transcript = Transcript::new(SessionId(session.to_string()));
    for input in &captured {
        transcript.push(Turn::user(input.clone()));
        transcript.push(Turn::assistant("noted"));
    }
    transcripts.save(transcript).await.expect("transcript save should succeed");

    let mut record = LeadRecord::empty(SessionId(session.to_string()));
    record.lead_id = Some(LeadId("00Q1".to_string()));
    record.status = LeadStatus::Created;
    record.captured_inputs = captured;
    leads.save(record).await.expect("lead save should succeed");
}

#[tokio::test]
async fn update_pass_short_circuits_without_new_input() {
    let leads = Arc::new(InMemoryLeadRepository::default());
    let transcripts = Arc::new(InMemoryTranscriptRepository::default());
    let crm = Arc::new(FakeCrm::default());

    let captured = vec!["hi, I am Jane Doe".to_string()];
    seed_linked_session(&leads, &transcripts, "s-7", captured).await;

    let engine = engine(Arc::clone(&leads), Arc::clone(&transcripts), jane_llm(), Arc::clone(&crm));
    let record = leads
        .find(&SessionId("s-7".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");

    let cutoff = Utc::now() - Duration::hours(48);
    let outcome = engine.reconcile_update(&record, cutoff).await.expect("pass should succeed");
    assert_eq!(outcome, UpdateOutcome::NoNewInput);
    assert!(crm.update_calls.lock().await.is_empty());
}

#[tokio::test]
async fn update_pass_short_circuits_when_fields_are_unchanged() {
    let leads = Arc::new(InMemoryLeadRepository::default());
    let transcripts = Arc::new(InMemoryTranscriptRepository::default());
    let crm = Arc::new(FakeCrm::default());
    let llm = jane_llm();

    seed_linked_session(&leads, &transcripts, "s-8", vec!["hi, I am Jane Doe".to_string()]).await;

    // Pre-store the snapshot the extractor will reproduce, then add a new
    // input that changes nothing.
    let mut record = leads
        .find(&SessionId("s-8".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    record.snapshot = leadflow_core::extract::snapshot_from_model_text(JANE_PAIRS);
    record.snapshot.promote_single_name();
    leads.save(record.clone()).await.expect("save should succeed");

    let mut transcript = transcripts
        .find(&SessionId("s-8".to_string()))
        .await
        .expect("find should succeed")
        .expect("transcript should exist");
    transcript.push(Turn::user("thanks, that is all".to_string()));
    transcript.push(Turn::assistant("you are welcome".to_string()));
    transcripts.save(transcript).await.expect("save should succeed");

    let engine = engine(Arc::clone(&leads), Arc::clone(&transcripts), llm, Arc::clone(&crm));
    let cutoff = Utc::now() - Duration::hours(48);
    let outcome = engine.reconcile_update(&record, cutoff).await.expect("pass should succeed");
    assert_eq!(outcome, UpdateOutcome::NoFieldDelta);
    assert!(crm.update_calls.lock().await.is_empty());
}

#[tokio::test]
async fn update_pass_pushes_changed_fields_to_the_crm() {
    let leads = Arc::new(InMemoryLeadRepository::default());
    let transcripts = Arc::new(InMemoryTranscriptRepository::default());
    let crm = Arc::new(FakeCrm::default());
    let llm = Arc::new(FakeLlm {
        extraction_reply: format!("{JANE_PAIRS}, Nationality: Canadian"),
        summary_reply: "Jane shared her nationality.".to_string(),
    });

    seed_linked_session(&leads, &transcripts, "s-9", vec!["hi, I am Jane Doe".to_string()]).await;

    let mut record = leads
        .find(&SessionId("s-9".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    record.snapshot = leadflow_core::extract::snapshot_from_model_text(JANE_PAIRS);
    record.snapshot.promote_single_name();
    leads.save(record.clone()).await.expect("save should succeed");

    let mut transcript = transcripts
        .find(&SessionId("s-9".to_string()))
        .await
        .expect("find should succeed")
        .expect("transcript should exist");
    transcript.push(Turn::user("I am Canadian".to_string()));
    transcript.push(Turn::assistant("noted".to_string()));
    transcripts.save(transcript).await.expect("save should succeed");

    let engine = engine(Arc::clone(&leads), Arc::clone(&transcripts), llm, Arc::clone(&crm));
    let cutoff = Utc::now() - Duration::hours(48);
    let outcome = engine.reconcile_update(&record, cutoff).await.expect("pass should succeed");
    assert_eq!(outcome, UpdateOutcome::Updated { lead_id: LeadId("00Q1".to_string()) });

    let updates = crm.update_calls.lock().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.get("Nationality__c").map(String::as_str), Some("Canadian"));

    let record = leads
        .find(&SessionId("s-9".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    assert_eq!(record.update_attempts, 1);
    assert_eq!(record.snapshot.nationality.as_deref(), Some("Canadian"));
}

#[tokio::test]
async fn failed_update_keeps_the_delta_pending_for_the_next_sweep() {
    let leads = Arc::new(InMemoryLeadRepository::default());
    let transcripts = Arc::new(InMemoryTranscriptRepository::default());
    let crm = Arc::new(FakeCrm::default());
    crm.script_update(Err(CrmError::Transport("gateway timeout".to_string()))).await;
    let llm = Arc::new(FakeLlm {
        extraction_reply: format!("{JANE_PAIRS}, Nationality: Canadian"),
        summary_reply: "Jane shared her nationality.".to_string(),
    });

    seed_linked_session(&leads, &transcripts, "s-10", vec!["hi, I am Jane Doe".to_string()]).await;

    let mut record = leads
        .find(&SessionId("s-10".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    record.snapshot = leadflow_core::extract::snapshot_from_model_text(JANE_PAIRS);
    record.snapshot.promote_single_name();
    leads.save(record.clone()).await.expect("save should succeed");

    let mut transcript = transcripts
        .find(&SessionId("s-10".to_string()))
        .await
        .expect("find should succeed")
        .expect("transcript should exist");
    transcript.push(Turn::user("I am Canadian".to_string()));
    transcript.push(Turn::assistant("noted".to_string()));
    transcripts.save(transcript).await.expect("save should succeed");

    let engine = engine(Arc::clone(&leads), Arc::clone(&transcripts), llm, Arc::clone(&crm));
    let cutoff = Utc::now() - Duration::hours(48);

    let record = leads
        .find(&SessionId("s-10".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    let outcome = engine.reconcile_update(&record, cutoff).await.expect("pass should succeed");
    assert!(matches!(outcome, UpdateOutcome::Failed { .. }));

    // The pass is counted, but the stored snapshot and captured inputs stay
    // at their last synced values so the change is not silently dropped.
    let record = leads
        .find(&SessionId("s-10".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    assert_eq!(record.update_attempts, 1);
    assert_eq!(record.snapshot.nationality, None);
    assert_eq!(record.captured_inputs, vec!["hi, I am Jane Doe".to_string()]);

    // The next sweep still sees the new input and retries the write.
    let outcome = engine.reconcile_update(&record, cutoff).await.expect("pass should succeed");
    assert_eq!(outcome, UpdateOutcome::Updated { lead_id: LeadId("00Q1".to_string()) });
    assert_eq!(crm.update_calls.lock().await.len(), 2);

    let record = leads
        .find(&SessionId("s-10".to_string()))
        .await
        .expect("find should succeed")
        .expect("record should exist");
    assert_eq!(record.update_attempts, 2);
    assert_eq!(record.snapshot.nationality.as_deref(), Some("Canadian"));
}
