//! End-to-end tests for the campaign pipeline.
//!
//! Everything runs against in-memory SQLite and the recording provider, so
//! no network access is needed.

use std::sync::Arc;

use campaign::ingest::{csv_rows, Row, RowError};
use campaign::{
    publish_all, DeliveryConfig, DeliveryError, DeliveryService, DispatchResult, InboundAction,
    IngestError, IngestSummary, Ingestor, InvitationError, InvitationService, OperatorEvent,
    Section, UploadMode, OPT_OUT_CONFIRMATION,
};
use database::{
    campaign as campaigns, contact, message, template, Contact, Database, MessageStatus,
    MessageType, StatusUpdate, TemplateSections,
};
use fanout::Registry;
use futures::StreamExt;
use sms_gateway::mock::RecordingProvider;
use sms_gateway::{compute_signature, ProviderStatus};

const AUTH_TOKEN: &str = "test-auth-token";
const INBOUND_URL: &str = "https://campaigns.example.com/api/webhook";
const STATUS_URL: &str = "https://campaigns.example.com/api/webhook/status";

struct Harness {
    db: Database,
    provider: Arc<RecordingProvider>,
    delivery: DeliveryService,
    invitations: InvitationService,
}

async fn harness_with(provider: RecordingProvider) -> Harness {
    let db = Database::in_memory().await.unwrap();
    let provider = Arc::new(provider);
    let delivery = DeliveryService::new(
        db.clone(),
        provider.clone(),
        DeliveryConfig::new(AUTH_TOKEN, INBOUND_URL, STATUS_URL),
    );
    let invitations = InvitationService::new(db.clone());

    Harness {
        db,
        provider,
        delivery,
        invitations,
    }
}

async fn harness() -> Harness {
    harness_with(RecordingProvider::new("+15550000")).await
}

async fn ingest(db: &Database, campaign_id: &str, mode: UploadMode, csv: &str) -> IngestSummary {
    let rows = csv_rows(std::io::Cursor::new(csv.to_string()), 16);
    Ingestor::new(db.clone())
        .ingest(campaign_id, mode, rows)
        .await
        .unwrap()
}

async fn contact_by_phone(db: &Database, campaign_id: &str, phone: &str) -> Contact {
    contact::get_contact_by_phone(db.pool(), campaign_id, phone)
        .await
        .unwrap()
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn signed(url: &str, pairs: &[(&str, &str)]) -> (String, Vec<(String, String)>) {
    let params = params(pairs);
    (compute_signature(AUTH_TOKEN, url, &params), params)
}

fn full_template() -> TemplateSections {
    let single = |text: &str| vec![text.to_string()];
    TemplateSections {
        greeting: single("Hello [NAME],"),
        identifier: single("id={extern_id}."),
        message: single("Please take our {topic} survey:"),
        link: single("{link}"),
        optout: single("Reply STOP to opt out."),
    }
}

mod ingestion {
    use super::*;

    const SIMPLE_CSV: &str = "name,phone,link,pin\n\
        Jane,+15550001,https://s/1,1111\n\
        John,+15550002,https://s/2,\n\
        Nolink,+15550003,,\n";

    #[tokio::test]
    async fn test_ingestion_is_idempotent() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();

        let first = ingest(&h.db, &survey.id, UploadMode::Simple, SIMPLE_CSV).await;
        let jane = contact_by_phone(&h.db, &survey.id, "+15550001").await;
        let second = ingest(&h.db, &survey.id, UploadMode::Simple, SIMPLE_CSV).await;

        assert_eq!(first, IngestSummary { imported: 2, rejected: 1 });
        assert_eq!(second, first);
        assert_eq!(contact::count_contacts(h.db.pool(), &survey.id).await.unwrap(), 2);
        assert_eq!(contact_by_phone(&h.db, &survey.id, "+15550001").await.id, jane.id);
    }

    #[tokio::test]
    async fn test_missing_link_is_rejected_only_in_simple_mode() {
        let h = harness().await;
        let simple = campaigns::create_campaign(h.db.pool(), "Simple", "op-a").await.unwrap();
        let advanced = campaigns::create_campaign(h.db.pool(), "Advanced", "op-a").await.unwrap();
        let csv = "name,phone,city\nJane,+15550001,Oslo\n";

        let summary = ingest(&h.db, &simple.id, UploadMode::Simple, csv).await;
        assert_eq!(summary, IngestSummary { imported: 0, rejected: 1 });

        let summary = ingest(&h.db, &advanced.id, UploadMode::Advanced, csv).await;
        assert_eq!(summary, IngestSummary { imported: 1, rejected: 0 });
        let jane = contact_by_phone(&h.db, &advanced.id, "+15550001").await;
        assert_eq!(jane.field("city"), Some("Oslo"));
    }

    #[tokio::test]
    async fn test_small_batches_and_trailing_flush() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();

        let csv: String = std::iter::once("name,phone\n".to_string())
            .chain((0..7).map(|n| format!("Person {n},+1555000{n}\n")))
            .collect();
        let rows = csv_rows(std::io::Cursor::new(csv), 2);
        let summary = Ingestor::with_batch_size(h.db.clone(), 3)
            .ingest(&survey.id, UploadMode::Advanced, rows)
            .await
            .unwrap();

        assert_eq!(summary, IngestSummary { imported: 7, rejected: 0 });
        assert_eq!(contact::count_contacts(h.db.pool(), &survey.id).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_counted_as_rejected() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        let csv = "name,phone\nJane,+15550001\nonly-one-field\nJohn,+15550002\n";

        let summary = ingest(&h.db, &survey.id, UploadMode::Advanced, csv).await;
        assert_eq!(summary, IngestSummary { imported: 2, rejected: 1 });
    }

    #[tokio::test]
    async fn test_read_error_aborts_but_keeps_committed_batches() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();

        let row = |name: &str, phone: &str| -> Result<Row, RowError> {
            Ok(Row::from([
                ("name".to_string(), name.to_string()),
                ("phone".to_string(), phone.to_string()),
            ]))
        };
        let rows = futures::stream::iter(vec![
            row("Jane", "+15550001"),
            Err(RowError::Io("connection reset".to_string())),
            row("John", "+15550002"),
        ]);

        let err = Ingestor::with_batch_size(h.db.clone(), 1)
            .ingest(&survey.id, UploadMode::Advanced, rows)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Read(_)));
        assert_eq!(contact::count_contacts(h.db.pool(), &survey.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_rejected() {
        let h = harness().await;
        let rows = csv_rows(std::io::Cursor::new("name,phone\nJane,+1\n"), 4);

        let err = Ingestor::new(h.db.clone())
            .ingest("missing", UploadMode::Advanced, rows)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::CampaignNotFound(id) if id == "missing"));
    }
}

mod invitations {
    use super::*;

    #[tokio::test]
    async fn test_generate_and_log_invitations() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        ingest(
            &h.db,
            &survey.id,
            UploadMode::Advanced,
            "name,phone,extern_id,link,topic\nJane,+15550001,002,https://s/1,\n",
        )
        .await;
        let jane = contact_by_phone(&h.db, &survey.id, "+15550001").await;
        let tpl = template::create_template(h.db.pool(), &survey.id, "default", &full_template())
            .await
            .unwrap();

        let stored = h
            .invitations
            .generate_invitations(&survey.id, &tpl.id, &[jane.id.clone()])
            .await
            .unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].contact_id, jane.id);
        assert_eq!(
            stored[0].text,
            "Hello Jane, id=002. Please take our {topic} survey: https://s/1 Reply STOP to opt out."
        );
        assert_eq!(h.invitations.list_invitations(&survey.id).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_incomplete_template_aborts_generation() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        ingest(&h.db, &survey.id, UploadMode::Advanced, "name,phone\nJane,+15550001\n").await;
        let jane = contact_by_phone(&h.db, &survey.id, "+15550001").await;

        let sections = TemplateSections {
            optout: Vec::new(),
            ..full_template()
        };
        let tpl = template::create_template(h.db.pool(), &survey.id, "broken", &sections)
            .await
            .unwrap();

        let err = h
            .invitations
            .generate_invitations(&survey.id, &tpl.id, &[jane.id])
            .await
            .unwrap_err();
        assert!(matches!(err, InvitationError::EmptySection(Section::Optout)));
        assert!(h.invitations.list_invitations(&survey.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_contacts_only_yield_nothing_generated() {
        let h = harness().await;
        let ours = campaigns::create_campaign(h.db.pool(), "Ours", "op-a").await.unwrap();
        let theirs = campaigns::create_campaign(h.db.pool(), "Theirs", "op-a").await.unwrap();
        ingest(&h.db, &theirs.id, UploadMode::Advanced, "name,phone\nJohn,+15550002\n").await;
        let john = contact_by_phone(&h.db, &theirs.id, "+15550002").await;
        let tpl = template::create_template(h.db.pool(), &ours.id, "default", &full_template())
            .await
            .unwrap();

        let err = h
            .invitations
            .generate_invitations(&ours.id, &tpl.id, &[john.id])
            .await
            .unwrap_err();
        assert!(matches!(err, InvitationError::NothingGenerated));
    }

    #[tokio::test]
    async fn test_unknown_contact_or_template() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        let tpl = template::create_template(h.db.pool(), &survey.id, "default", &full_template())
            .await
            .unwrap();

        let err = h
            .invitations
            .generate_invitations(&survey.id, &tpl.id, &["nobody".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, InvitationError::ContactNotFound(id) if id == "nobody"));

        let err = h
            .invitations
            .generate_invitations(&survey.id, "no-template", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, InvitationError::TemplateNotFound(_)));
    }
}

mod dispatch {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_records_outgoing_message() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        ingest(&h.db, &survey.id, UploadMode::Advanced, "name,phone\nJane,+15550001\n").await;
        let jane = contact_by_phone(&h.db, &survey.id, "+15550001").await;

        let message = h
            .delivery
            .dispatch("op-a", &jane, "Hi Jane", Some("2026-01-01T09:00:00Z"))
            .await
            .unwrap();

        assert_eq!(message.message_type, MessageType::Outgoing);
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.operator_id, "op-a");
        assert!(message.provider_sid.is_some());
        assert_eq!(message.scheduled_for.as_deref(), Some("2026-01-01T09:00:00Z"));

        let requests = h.provider.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].to, "+15550001");
        assert_eq!(requests[0].send_at.as_deref(), Some("2026-01-01T09:00:00Z"));
    }

    #[tokio::test]
    async fn test_acknowledgment_status_becomes_initial_status() {
        let h = harness_with(RecordingProvider::new("+15550000").with_status(ProviderStatus::Accepted)).await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        ingest(&h.db, &survey.id, UploadMode::Advanced, "name,phone\nJane,+15550001\n").await;
        let jane = contact_by_phone(&h.db, &survey.id, "+15550001").await;

        let message = h.delivery.dispatch("op-a", &jane, "Hi", None).await.unwrap();
        assert_eq!(message.status, MessageStatus::Queued);
    }

    #[tokio::test]
    async fn test_opted_out_contact_never_reaches_provider() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        ingest(&h.db, &survey.id, UploadMode::Advanced, "name,phone\nJane,+15550001\n").await;
        contact::opt_out_by_phone(h.db.pool(), "+15550001").await.unwrap();
        let jane = contact_by_phone(&h.db, &survey.id, "+15550001").await;

        let err = h.delivery.dispatch("op-a", &jane, "Hi", None).await.unwrap_err();

        assert!(matches!(err, DeliveryError::OptedOut { .. }));
        assert_eq!(h.provider.request_count().await, 0);
        assert!(message::list_messages_for_contact(h.db.pool(), &jane.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_provider_rejections_are_classified_and_not_recorded() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        ingest(
            &h.db,
            &survey.id,
            UploadMode::Advanced,
            "name,phone\nJane,+15550001\nJohn,bogus\n",
        )
        .await;
        h.provider.fail_for("+15550001", 21614).await;
        h.provider.fail_for("bogus", 21211).await;

        let jane = contact_by_phone(&h.db, &survey.id, "+15550001").await;
        let err = h.delivery.dispatch("op-a", &jane, "Hi", None).await.unwrap_err();
        assert!(matches!(err, DeliveryError::RecipientBlocked { .. }));

        let john = contact_by_phone(&h.db, &survey.id, "bogus").await;
        let err = h.delivery.dispatch("op-a", &john, "Hi", None).await.unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidNumber { .. }));

        assert!(message::list_messages_for_operator(h.db.pool(), "op-a", 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_invitations_reports_per_contact() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        ingest(
            &h.db,
            &survey.id,
            UploadMode::Simple,
            "name,phone,link\nJane,+15550001,https://s/1\nJohn,+15550002,https://s/2\nAmy,+15550003,https://s/3\n",
        )
        .await;
        contact::opt_out_by_phone(h.db.pool(), "+15550002").await.unwrap();
        h.provider.fail_for("+15550003", 21614).await;

        let ids: Vec<String> = contact::list_contacts(h.db.pool(), &survey.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        let tpl = template::create_template(h.db.pool(), &survey.id, "default", &full_template())
            .await
            .unwrap();
        let stored = h
            .invitations
            .generate_invitations(&survey.id, &tpl.id, &ids)
            .await
            .unwrap();

        let mut invitation_ids: Vec<i64> = stored.iter().map(|i| i.id).collect();
        invitation_ids.push(999);
        let report = h
            .delivery
            .dispatch_invitations("op-a", &survey.id, &invitation_ids)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 3);
        assert!(matches!(
            report.outcomes.last().unwrap().result,
            DispatchResult::Failed { .. }
        ));
        // The opted-out contact never reached the provider.
        assert_eq!(h.provider.request_count().await, 2);
    }
}

mod webhooks {
    use super::*;

    async fn two_campaigns_sharing_a_phone(h: &Harness) -> (Contact, Contact) {
        let a = campaigns::create_campaign(h.db.pool(), "A", "op-a").await.unwrap();
        let b = campaigns::create_campaign(h.db.pool(), "B", "op-b").await.unwrap();
        ingest(&h.db, &a.id, UploadMode::Advanced, "name,phone\nJane,+15550001\n").await;
        ingest(&h.db, &b.id, UploadMode::Advanced, "name,phone\nJane B,+15550001\n").await;
        (
            contact_by_phone(&h.db, &a.id, "+15550001").await,
            contact_by_phone(&h.db, &b.id, "+15550001").await,
        )
    }

    #[tokio::test]
    async fn test_stop_opts_out_everywhere_with_one_confirmation() {
        let h = harness().await;
        let (in_a, in_b) = two_campaigns_sharing_a_phone(&h).await;

        let (signature, params) = signed(INBOUND_URL, &[("From", "+15550001"), ("Body", "  Stop ")]);
        let outcome = h
            .delivery
            .handle_inbound_webhook(Some(&signature), &params)
            .await
            .unwrap();

        match &outcome.action {
            InboundAction::OptedOut {
                contact_ids,
                confirmation_sent,
            } => {
                assert_eq!(contact_ids.len(), 2);
                assert!(confirmation_sent);
            }
            other => panic!("Unexpected action: {:?}", other),
        }

        let requests = h.provider.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].to, "+15550001");
        assert_eq!(requests[0].body, OPT_OUT_CONFIRMATION);

        for contact in [&in_a, &in_b] {
            let stored = contact::get_contact(h.db.pool(), &contact.id).await.unwrap();
            assert!(stored.opted_out);
        }

        let mut operators: Vec<&str> = outcome
            .publications
            .iter()
            .map(|p| p.operator_id.as_str())
            .collect();
        operators.sort();
        assert_eq!(operators, vec!["op-a", "op-b"]);
    }

    #[tokio::test]
    async fn test_redelivered_stop_confirms_once() {
        let h = harness().await;
        let (in_a, in_b) = two_campaigns_sharing_a_phone(&h).await;

        let (signature, params) = signed(
            INBOUND_URL,
            &[("From", "+15550001"), ("Body", "STOP"), ("MessageSid", "SMstop1")],
        );
        let first = h
            .delivery
            .handle_inbound_webhook(Some(&signature), &params)
            .await
            .unwrap();
        assert!(matches!(first.action, InboundAction::OptedOut { .. }));
        assert_eq!(first.publications.len(), 2);

        let again = h
            .delivery
            .handle_inbound_webhook(Some(&signature), &params)
            .await
            .unwrap();
        assert!(matches!(again.action, InboundAction::Duplicate(ref m) if m.provider_sid.as_deref() == Some("SMstop1")));
        assert!(again.publications.is_empty());
        assert_eq!(h.provider.request_count().await, 1);

        // The stop itself is logged once, against the newest contact.
        let logged = message::list_messages_for_contact(h.db.pool(), &in_b.id).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].message_type, MessageType::Incoming);
        assert!(message::list_messages_for_contact(h.db.pool(), &in_a.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_events_reach_only_the_owning_operator() {
        let h = harness().await;
        let (in_a, _) = two_campaigns_sharing_a_phone(&h).await;
        let registry = Arc::new(Registry::new(8));
        let mut op_a = registry.register("op-a");
        let mut op_c = registry.register("op-c");

        let (signature, params) = signed(INBOUND_URL, &[("From", "+15550001"), ("Body", "STOP")]);
        let outcome = h
            .delivery
            .handle_inbound_webhook(Some(&signature), &params)
            .await
            .unwrap();

        // op-b has no open stream, so only op-a's event is delivered.
        assert_eq!(publish_all(&registry, outcome.publications), 1);

        match op_a.next().await {
            Some(OperatorEvent::ContactOptedOut(opt_out)) => assert_eq!(opt_out.contact_id, in_a.id),
            other => panic!("Unexpected event: {:?}", other),
        }
        let nothing = tokio::time::timeout(std::time::Duration::from_millis(20), op_c.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_reingestion_keeps_opt_out() {
        let h = harness().await;
        let (in_a, _) = two_campaigns_sharing_a_phone(&h).await;

        let (signature, params) = signed(INBOUND_URL, &[("From", "+15550001"), ("Body", "stop")]);
        h.delivery
            .handle_inbound_webhook(Some(&signature), &params)
            .await
            .unwrap();

        ingest(&h.db, &in_a.campaign_id, UploadMode::Advanced, "name,phone\nJane Renamed,+15550001\n").await;

        let stored = contact::get_contact(h.db.pool(), &in_a.id).await.unwrap();
        assert_eq!(stored.name, "Jane Renamed");
        assert!(stored.opted_out);
    }

    #[tokio::test]
    async fn test_reply_is_recorded_for_newest_contact() {
        let h = harness().await;
        let (_, in_b) = two_campaigns_sharing_a_phone(&h).await;

        let (signature, params) = signed(
            INBOUND_URL,
            &[("From", "+15550001"), ("Body", "Sure, happy to help"), ("MessageSid", "SMin1")],
        );
        let outcome = h
            .delivery
            .handle_inbound_webhook(Some(&signature), &params)
            .await
            .unwrap();

        let InboundAction::Recorded(message) = &outcome.action else {
            panic!("Unexpected action: {:?}", outcome.action);
        };
        assert_eq!(message.contact_id, in_b.id);
        assert_eq!(message.operator_id, "op-b");
        assert_eq!(message.message_type, MessageType::Incoming);
        assert_eq!(message.status, MessageStatus::Delivered);
        assert_eq!(outcome.publications.len(), 1);
        assert_eq!(outcome.publications[0].operator_id, "op-b");
        assert_eq!(h.provider.request_count().await, 0);

        // Redelivery of the same provider message is a no-op.
        let again = h
            .delivery
            .handle_inbound_webhook(Some(&signature), &params)
            .await
            .unwrap();
        assert!(matches!(again.action, InboundAction::Duplicate(ref m) if m.id == message.id));
        assert!(again.publications.is_empty());
    }

    #[tokio::test]
    async fn test_bad_signature_changes_nothing() {
        let h = harness().await;
        let (in_a, _) = two_campaigns_sharing_a_phone(&h).await;
        let (_, params) = signed(INBOUND_URL, &[("From", "+15550001"), ("Body", "STOP")]);
        let (wrong_url_signature, _) = signed(STATUS_URL, &[("From", "+15550001"), ("Body", "STOP")]);

        for signature in [None, Some("bm90LWEtc2lnbmF0dXJl"), Some(wrong_url_signature.as_str())] {
            let err = h
                .delivery
                .handle_inbound_webhook(signature, &params)
                .await
                .unwrap_err();
            assert!(matches!(err, DeliveryError::InvalidSignature));
        }

        let stored = contact::get_contact(h.db.pool(), &in_a.id).await.unwrap();
        assert!(!stored.opted_out);
        assert_eq!(h.provider.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_sender_is_rejected() {
        let h = harness().await;
        let (signature, params) = signed(INBOUND_URL, &[("From", "+19999999"), ("Body", "hi")]);

        let err = h
            .delivery
            .handle_inbound_webhook(Some(&signature), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::ContactNotFound(_)));
    }

    #[tokio::test]
    async fn test_status_only_moves_forward() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        ingest(&h.db, &survey.id, UploadMode::Advanced, "name,phone\nJane,+15550001\n").await;
        let jane = contact_by_phone(&h.db, &survey.id, "+15550001").await;
        let sent = h.delivery.dispatch("op-a", &jane, "Hi", None).await.unwrap();
        let sid = sent.provider_sid.clone().unwrap();

        let callback = |status: &str| signed(STATUS_URL, &[("MessageSid", sid.as_str()), ("MessageStatus", status)]);

        let (signature, params) = callback("delivered");
        let outcome = h
            .delivery
            .handle_status_callback(Some(&signature), &params)
            .await
            .unwrap();
        assert!(matches!(outcome.update, StatusUpdate::Applied(ref m) if m.status == MessageStatus::Delivered));
        match &outcome.publications[0].event {
            OperatorEvent::MessageStatus(change) => {
                assert_eq!(change.message_id, sent.id);
                assert_eq!(change.status, MessageStatus::Delivered);
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        // Late and illegal callbacks are ignored.
        for late in ["sent", "queued", "failed"] {
            let (signature, params) = callback(late);
            let outcome = h
                .delivery
                .handle_status_callback(Some(&signature), &params)
                .await
                .unwrap();
            assert_eq!(
                outcome.update,
                StatusUpdate::Ignored {
                    current: MessageStatus::Delivered
                }
            );
            assert!(outcome.publications.is_empty());
        }

        let (signature, params) = callback("read");
        let outcome = h
            .delivery
            .handle_status_callback(Some(&signature), &params)
            .await
            .unwrap();
        assert!(matches!(outcome.update, StatusUpdate::Applied(ref m) if m.status == MessageStatus::Read));
    }

    #[tokio::test]
    async fn test_status_callback_leaves_incoming_messages_alone() {
        let h = harness().await;
        let (_, in_b) = two_campaigns_sharing_a_phone(&h).await;
        let (signature, params) = signed(
            INBOUND_URL,
            &[("From", "+15550001"), ("Body", "Maybe later"), ("MessageSid", "SMin9")],
        );
        h.delivery
            .handle_inbound_webhook(Some(&signature), &params)
            .await
            .unwrap();

        let (signature, params) = signed(STATUS_URL, &[("MessageSid", "SMin9"), ("MessageStatus", "read")]);
        let outcome = h
            .delivery
            .handle_status_callback(Some(&signature), &params)
            .await
            .unwrap();
        assert_eq!(
            outcome.update,
            StatusUpdate::Ignored {
                current: MessageStatus::Delivered
            }
        );
        assert!(outcome.publications.is_empty());

        let stored = message::get_message_by_provider_sid(h.db.pool(), "SMin9").await.unwrap();
        assert_eq!(stored.contact_id, in_b.id);
        assert_eq!(stored.status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn test_failure_callback_records_error_code() {
        let h = harness().await;
        let survey = campaigns::create_campaign(h.db.pool(), "Survey", "op-a").await.unwrap();
        ingest(&h.db, &survey.id, UploadMode::Advanced, "name,phone\nJane,+15550001\n").await;
        let jane = contact_by_phone(&h.db, &survey.id, "+15550001").await;
        let sent = h.delivery.dispatch("op-a", &jane, "Hi", None).await.unwrap();
        let sid = sent.provider_sid.unwrap();

        let (signature, params) = signed(
            STATUS_URL,
            &[("MessageSid", sid.as_str()), ("MessageStatus", "undelivered"), ("ErrorCode", "30003")],
        );
        let outcome = h
            .delivery
            .handle_status_callback(Some(&signature), &params)
            .await
            .unwrap();

        let StatusUpdate::Applied(message) = outcome.update else {
            panic!("Expected the failure to apply");
        };
        assert_eq!(message.status, MessageStatus::Failed);
        assert_eq!(message.error_code, Some(30003));
    }

    #[tokio::test]
    async fn test_status_for_unknown_sid() {
        let h = harness().await;
        let (signature, params) = signed(STATUS_URL, &[("MessageSid", "SMnope"), ("MessageStatus", "sent")]);

        let err = h
            .delivery
            .handle_status_callback(Some(&signature), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::MessageNotFound(sid) if sid == "SMnope"));
    }
}
