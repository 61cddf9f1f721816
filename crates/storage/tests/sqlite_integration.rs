use academy_core::model::{
    Identity, Question, QuizAttempt, QuizDefinition, QuizId, SessionRecord, SessionToken,
    UNANSWERED,
};
use academy_core::time::fixed_now;
use storage::repository::{
    AttemptRepository, QuizRepository, SessionRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

fn options() -> Vec<String> {
    vec!["a".into(), "b".into(), "c".into(), "d".into()]
}

fn build_quiz(id: &str) -> QuizDefinition {
    QuizDefinition::new(
        QuizId::new(id),
        "class-10",
        "maths",
        "Algebra",
        "Chapter test",
        vec![
            Question::new("What is 2 + 2?", options(), 1).unwrap(),
            Question::new("What is 3 * 3?", options(), 3).unwrap(),
        ],
        1,
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_session_round_trip_and_delete() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_sessions?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let identity = Identity::new("student-1");
    let record = SessionRecord::new(SessionToken::generate(), fixed_now());

    repo.upsert_session(&identity, &record).await.unwrap();
    let fetched = repo.get_session(&identity).await.unwrap();
    assert_eq!(fetched, Some(record.clone()));

    // A newer login overwrites the record in place.
    let newer = SessionRecord::new(SessionToken::generate(), fixed_now());
    repo.upsert_session(&identity, &newer).await.unwrap();
    let fetched = repo.get_session(&identity).await.unwrap().unwrap();
    assert!(fetched.matches(newer.active_session_id()));
    assert!(!fetched.matches(record.active_session_id()));

    repo.delete_session(&identity).await.unwrap();
    assert_eq!(repo.get_session(&identity).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_quiz_round_trip_preserves_question_order() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_quizzes?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let quiz = build_quiz("q1");
    repo.upsert_quiz(&quiz).await.unwrap();

    let fetched = repo.get_quiz(quiz.id()).await.unwrap();
    assert_eq!(fetched, quiz);
    assert_eq!(fetched.questions()[0].prompt(), "What is 2 + 2?");
    assert_eq!(fetched.questions()[1].correct_answer(), 3);

    assert!(matches!(
        repo.get_quiz(&QuizId::new("missing")).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_upsert_quiz_replaces_questions() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_replace?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let quiz = build_quiz("q1");
    repo.upsert_quiz(&quiz).await.unwrap();

    let revised = QuizDefinition::new(
        QuizId::new("q1"),
        "class-10",
        "maths",
        "Algebra (revised)",
        "",
        vec![Question::new("Only question", options(), 0).unwrap()],
        2,
    )
    .unwrap();
    repo.upsert_quiz(&revised).await.unwrap();

    let fetched = repo.get_quiz(revised.id()).await.unwrap();
    assert_eq!(fetched.total_questions(), 1);
    assert_eq!(fetched.time_limit_minutes(), 2);
}

#[tokio::test]
async fn sqlite_attempt_round_trip_with_sentinel_answers() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_attempts?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let quiz = build_quiz("q1");
    repo.upsert_quiz(&quiz).await.unwrap();

    let attempt =
        QuizAttempt::grade(&quiz, "Asha", vec![1, UNANSWERED], 20, fixed_now()).unwrap();
    let id = repo.insert_attempt(&attempt).await.unwrap();

    let fetched = repo.get_attempt(&id).await.unwrap();
    assert_eq!(fetched, attempt);
    assert_eq!(fetched.answers(), &[1, UNANSWERED]);
    assert_eq!(fetched.score(), 1);

    let listed = repo.list_attempts_for_quiz(quiz.id()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].0, id);
}

#[tokio::test]
async fn sqlite_backend_is_poll_only() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_pollonly?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    assert!(repo.watch_sessions().is_none());
}
