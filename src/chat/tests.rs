use super::*;
use crate::config::Config;
use crate::database::Database;
use crate::database::lancedb::{EmbeddingRecord, EntityType, VectorStore, new_vector_id};
use crate::database::sqlite::{NewCourse, NewUniversity};
use crate::llm::fake::{FakeModel, fake_embedding};
use crate::llm::prompts::IntentTarget;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

const DIM: usize = 32;

struct Fixture {
    _temp_dir: TempDir,
    model: Arc<FakeModel>,
    assistant: ChatAssistant,
}

async fn fixture(model: FakeModel) -> Fixture {
    let temp_dir = TempDir::new().expect("temp dir");
    let mut config = Config::with_base_dir(temp_dir.path());
    config.llm.embedding_dimension = DIM as u32;

    let database = Arc::new(Database::initialize(&config).await.expect("database"));
    let vector_store = Arc::new(VectorStore::new(&config).await.expect("vector store"));

    let university = database
        .upsert_university(NewUniversity {
            name: "University of Tartu".to_string(),
            country: "Estonia".to_string(),
            description: "Oldest university in Estonia".to_string(),
        })
        .await
        .expect("university");
    let course = database
        .upsert_course(NewCourse {
            university_id: university.id,
            name: "Computer Science".to_string(),
            degree_type: "Master".to_string(),
            field_of_study: "computing".to_string(),
            fee_structure: Some("6000 EUR per year".to_string()),
            ..NewCourse::default()
        })
        .await
        .expect("course");
    let course_row = database
        .get_course_by_id(course.id)
        .await
        .expect("get course")
        .expect("course exists");

    for (entity, id, text) in [
        (EntityType::University, university.id, university.embedding_text()),
        (EntityType::Course, course.id, course_row.embedding_text()),
    ] {
        let vector_id = new_vector_id();
        vector_store
            .upsert_embedding(&EmbeddingRecord::new(
                vector_id.as_str(),
                fake_embedding(&text, DIM),
                entity,
                id,
                "seed",
            ))
            .await
            .expect("embedding");
    }

    let model = Arc::new(model);
    let shared: SharedModel = model.clone();
    let search = SemanticSearch::new(database, vector_store, shared.clone(), config.search);

    Fixture {
        _temp_dir: temp_dir,
        model,
        assistant: ChatAssistant::new(search, shared),
    }
}

#[test]
fn exit_commands_are_case_insensitive() {
    assert!(is_exit_command("exit"));
    assert!(is_exit_command("  QUIT "));
    assert!(is_exit_command("Exit"));
    assert!(!is_exit_command("exiting"));
    assert!(!is_exit_command(""));
}

#[test]
fn context_formats_numbered_blocks() {
    let context = ChatContext {
        universities: vec![UniversityHit {
            id: 1,
            name: "Aalto University".to_string(),
            country: "Finland".to_string(),
            description: String::new(),
            similarity_score: 0.8,
        }],
        courses: vec![CourseHit {
            id: 4,
            name: "Game Design".to_string(),
            university_name: "Aalto University".to_string(),
            description: "Designing games".to_string(),
            degree_type: "Master".to_string(),
            field_of_study: "design".to_string(),
            starting_date: Some("September".to_string()),
            duration: None,
            fee_structure: None,
            language_of_study: Some("English".to_string()),
            similarity_score: 0.7,
        }],
    };

    let text = context.to_string();

    assert!(text.starts_with("Universities:\n1. Aalto University (Finland)\n"));
    assert!(text.contains("Courses:\n1. Game Design at Aalto University\n"));
    assert!(text.contains("   Starts: September\n"));
    assert!(text.contains("   Language: English\n"));
    assert!(!text.contains("Duration:"));
    assert!(!text.contains("Fees:"));
}

#[test]
fn empty_context_formats_to_nothing() {
    let context = ChatContext::default();
    assert!(context.is_empty());
    assert_eq!(context.to_string(), "");
}

#[tokio::test]
async fn course_intent_looks_up_courses_only() {
    let fx = fixture(
        FakeModel::new(DIM)
            .with_intent(r#"{"requires_lookup": true, "target": "course", "reason": "asks for a course"}"#),
    )
    .await;

    let reply = fx.assistant.respond("computer science masters?").await;

    assert_eq!(reply.intent.target, IntentTarget::Course);
    assert_eq!(reply.answer, "fake answer");
    assert_eq!(reply.context.courses.len(), 1);
    assert_eq!(reply.context.courses[0].name, "Computer Science");
    assert!(reply.context.universities.is_empty());

    let prompt = fx.model.last_prompt().expect("answer prompt");
    assert!(prompt.contains("Courses:"));
    assert!(prompt.contains("6000 EUR per year"));
}

#[tokio::test]
async fn both_intent_looks_up_everything() {
    let fx = fixture(
        FakeModel::new(DIM).with_intent(r#"{"requires_lookup": true, "target": "both"}"#),
    )
    .await;

    let reply = fx.assistant.respond("Estonia computer science").await;

    assert_eq!(reply.context.courses.len(), 1);
    assert_eq!(reply.context.universities.len(), 1);
}

#[tokio::test]
async fn lookup_without_a_known_target_searches_both() {
    for intent in [
        r#"{"requires_lookup": true, "target": "unknown"}"#,
        r#"{"requires_lookup": true, "target": "scholarships"}"#,
        r#"{"requires_lookup": true}"#,
    ] {
        let fx = fixture(FakeModel::new(DIM).with_intent(intent)).await;

        let reply = fx.assistant.respond("Estonia computer science").await;

        assert_eq!(reply.intent.target, IntentTarget::Unknown, "intent {intent}");
        assert_eq!(reply.context.courses.len(), 1, "intent {intent}");
        assert_eq!(reply.context.universities.len(), 1, "intent {intent}");
    }
}

#[tokio::test]
async fn no_lookup_skips_embedding() {
    let fx = fixture(
        FakeModel::new(DIM).with_intent(r#"{"requires_lookup": false, "target": "unknown"}"#),
    )
    .await;

    let reply = fx.assistant.respond("hello there").await;

    assert!(reply.context.is_empty());
    assert_eq!(fx.model.embed_calls.load(Ordering::SeqCst), 0);
    let prompt = fx.model.last_prompt().expect("answer prompt");
    assert!(!prompt.contains("Universities:"));
}

#[tokio::test]
async fn classification_failure_falls_back_to_direct_answer() {
    let fx = fixture(FakeModel::new(DIM)).await;

    let reply = fx.assistant.respond("Which universities are in Estonia?").await;

    assert!(!reply.intent.requires_lookup);
    assert_eq!(reply.intent.target, IntentTarget::Unknown);
    assert!(reply.context.is_empty());
    assert_eq!(reply.answer, "fake answer");
}

#[tokio::test]
async fn malformed_intent_falls_back() {
    let fx = fixture(FakeModel::new(DIM).with_intent("I think it is about courses")).await;

    let reply = fx.assistant.respond("courses?").await;

    assert!(!reply.intent.requires_lookup);
    assert_eq!(reply.intent.target, IntentTarget::Unknown);
}

#[tokio::test]
async fn embedding_failure_answers_without_context() {
    let fx = fixture(
        FakeModel::new(DIM).with_intent(r#"{"requires_lookup": true, "target": "both"}"#),
    )
    .await;
    fx.model.fail_embeddings.store(true, Ordering::SeqCst);

    let reply = fx.assistant.respond("computer science").await;

    assert!(reply.intent.requires_lookup);
    assert!(reply.context.is_empty());
    assert_eq!(reply.answer, "fake answer");
}

#[tokio::test]
async fn generation_failure_returns_apology() {
    let fx = fixture(
        FakeModel::new(DIM).with_intent(r#"{"requires_lookup": false, "target": "unknown"}"#),
    )
    .await;
    fx.model.fail_answers.store(true, Ordering::SeqCst);

    let reply = fx.assistant.respond("hello").await;

    assert_eq!(reply.answer, APOLOGY);
}
