mod common;

use std::sync::Arc;
use std::time::Duration;

use assignment_grader::models::{LeniencyRule, MetadataSource};
use assignment_grader::{
    ChatBackend, Feedback, GradingFlow, GradingRequest, GuardedBackend, ProcessingMethod, Score,
    SubmissionInput,
};
use common::{image, scan_reply, test_config, Reply, ScriptedBackend};
use tokio_test::{assert_err, assert_ok};

const RUBRIC: &str = "Q1 (5 pts): solve 2x + 5 = 13. Q2 (5 pts): show work.";

fn flow(backend: Arc<ScriptedBackend>) -> GradingFlow {
    GradingFlow::new(backend, &test_config())
}

fn flow_with_metadata(backend: Arc<ScriptedBackend>) -> GradingFlow {
    let config = assignment_grader::Config {
        enable_metadata_extraction: true,
        ..test_config()
    };
    GradingFlow::new(backend, &config)
}

#[tokio::test]
async fn test_math_text_gets_leniency_and_header() {
    let backend = ScriptedBackend::new()
        .reply(
            "text_grade",
            Reply::ok(
                r#"```json
{"total_score": "8.5/10", "percentage": "85%",
 "questions": [
   {"question_number": 1, "points_earned": 5, "points_possible": 5, "student_answer": "x = 4", "correct_answer": "x = 4"},
   {"question_number": 2, "points_earned": 3.5, "points_possible": 5, "mistakes_identified": ["skipped a step"]}
 ],
 "overall_feedback": {"strengths": ["correct answer"], "areas_for_improvement": ["show steps"], "next_steps": "practice"}}
```"#,
            ),
        )
        .build();
    let request = GradingRequest::new(
        "Math",
        SubmissionInput::text("Name: Jane Doe\nAssignment: Homework 3\n2x + 5 = 13\nx = 4"),
        RUBRIC,
    );

    let result = assert_ok!(flow_with_metadata(backend.clone()).grade(request).await);

    assert_eq!(result.score, Score::Fraction { earned: 10.0, total: 10.0 });
    assert_eq!(result.processing_method, ProcessingMethod::TextSubmission);
    let leniency = result.diagnostics.leniency.clone().unwrap();
    assert_eq!(leniency.rule, LeniencyRule::FullCredit);
    assert_eq!(leniency.original, "8.5/10");
    match &result.feedback {
        Feedback::Structured(s) => assert_eq!(s.total_score, "10/10"),
        other => panic!("unexpected feedback: {other:?}"),
    }
    assert!(result
        .formatted_feedback
        .starts_with("**STUDENT: JANE DOE**\n**ASSIGNMENT: Homework 3**\n"));
    assert!(result.formatted_feedback.contains("**Overall Score: 100%**"));
    // 姓名和标题都由标签匹配得到，不需要额外调用
    assert_eq!(backend.calls(), vec!["text_grade"]);
    assert_eq!(
        result.student_name_info.as_ref().unwrap().source,
        MetadataSource::Pattern
    );
}

#[tokio::test]
async fn test_essay_legacy_reply_without_metadata() {
    let backend = ScriptedBackend::new()
        .reply("text_grade", Reply::ok(r#"{"score": 88, "feedback": "Clear thesis."}"#))
        .reply(
            "name",
            Reply::ok(r#"{"student_name": null, "confidence": "low", "location": "not found"}"#),
        )
        .reply("title", Reply::ok(r#"{"assignment_title": "null"}"#))
        .build();
    let request = GradingRequest::new(
        "Essay",
        SubmissionInput::text("Photosynthesis turns light into chemical energy."),
        "Thesis, evidence, clarity",
    );

    let result = assert_ok!(flow_with_metadata(backend.clone()).grade(request).await);

    assert_eq!(result.score, Score::Numeric(88.0));
    assert!(result.diagnostics.leniency.is_none());
    assert!(result.formatted_feedback.starts_with("**GRADING REPORT**\n"));
    assert!(result.formatted_feedback.ends_with("Clear thesis."));
    assert_eq!(backend.calls(), vec!["text_grade", "name", "title"]);
    assert!(result.extracted_text.is_none());
}

#[tokio::test]
async fn test_caller_metadata_wins() {
    let backend = ScriptedBackend::new()
        .reply("text_grade", Reply::ok(r#"{"score": "9/10", "feedback": "Good."}"#))
        .build();
    let request = GradingRequest::new("Essay", SubmissionInput::text("Name: Jane Doe\nessay"), "rubric")
        .with_student_name("Alex Kim")
        .with_assignment_title("Unit 4 Essay");

    let result = assert_ok!(flow_with_metadata(backend.clone()).grade(request).await);

    let name = result.student_name_info.unwrap();
    assert_eq!(name.value(), Some("Alex Kim"));
    assert_eq!(name.location, "provided by caller");
    assert!(result
        .formatted_feedback
        .starts_with("**STUDENT: ALEX KIM**\n**ASSIGNMENT: Unit 4 Essay**\n"));
    assert_eq!(backend.count("name"), 0);
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let backend = ScriptedBackend::new().build();
    let flow = flow(backend.clone());

    let err = assert_err!(
        flow.grade(GradingRequest::new("Essay", SubmissionInput::text("   "), "rubric"))
            .await
    );
    assert_eq!(err.kind(), "InvalidInput");

    let err = assert_err!(
        flow.grade(GradingRequest::new("Essay", SubmissionInput::image(vec![1u8; 20]), "rubric"))
            .await
    );
    assert_eq!(err.kind(), "InvalidInput");

    let err = assert_err!(
        flow.grade(GradingRequest::new("Essay", SubmissionInput::text("essay"), " "))
            .await
    );
    assert_eq!(err.kind(), "InvalidInput");
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_unparseable_reply_becomes_not_available() {
    let backend = ScriptedBackend::new()
        .reply("text_grade", Reply::ok("I'd give this a B+, nice work overall."))
        .build();
    let request = GradingRequest::new("Essay", SubmissionInput::text("essay"), "rubric");

    let result = assert_ok!(flow(backend).grade(request).await);

    assert_eq!(result.score, Score::NotAvailable);
    assert_eq!(result.diagnostics.error_kind.as_deref(), Some("ParseFailure"));
    assert!(result.formatted_feedback.contains("I'd give this a B+"));
}

#[tokio::test]
async fn test_out_of_range_score_is_error() {
    let backend = ScriptedBackend::new()
        .reply("text_grade", Reply::ok(r#"{"score": "12/10", "feedback": "great"}"#))
        .build();
    let request = GradingRequest::new("Essay", SubmissionInput::text("essay"), "rubric");

    let result = assert_ok!(flow(backend).grade(request).await);

    assert_eq!(result.score, Score::Error);
    assert_eq!(
        result.diagnostics.error_kind.as_deref(),
        Some("InvalidScoreFormat")
    );
    assert!(result.formatted_feedback.starts_with("**GRADING ERROR**"));
}

#[tokio::test]
async fn test_mcq_full_credit_in_text_grading() {
    let backend = ScriptedBackend::new()
        .reply(
            "text_grade",
            Reply::ok(
                r#"{"total_score": "5/10", "questions": [
                    {"question_number": "1", "points_earned": 0, "points_possible": 5,
                     "student_selection": "Option B", "expected_response": "B", "is_satisfactory": "false"},
                    {"question_number": "2", "points_earned": 5, "points_possible": 5,
                     "student_response": "C", "expected_response": "C", "is_satisfactory": true}
                ]}"#,
            ),
        )
        .build();
    let request = GradingRequest::new("Multiple Choice", SubmissionInput::text("1. B\n2. C"), "1: B, 2: C");

    let result = assert_ok!(flow(backend).grade(request).await);

    assert_eq!(result.score, Score::Fraction { earned: 10.0, total: 10.0 });
    assert_eq!(result.diagnostics.mcq_adjustments, 1);
    assert!(result.diagnostics.leniency.is_none());
}

#[tokio::test]
async fn test_vision_primary_with_corner_name() {
    let backend = ScriptedBackend::new()
        .reply("classify", Reply::ok(scan_reply(3, 1)))
        .reply(
            "vision_grade",
            Reply::ok(r#"{"score": "3/4", "feedback": "Q1-Q3 correct", "mcq_analysis": "Q1: B"}"#),
        )
        .reply(
            "corner",
            Reply::ok(r#"{"top_left": null, "top_right": "John Smith", "bottom_left": null, "bottom_right": "1"}"#),
        )
        .build();
    let request = GradingRequest::new("Quiz", SubmissionInput::image(image(7)), "Q1 B, Q2 B, Q3 B, Q4 essay");

    let result = assert_ok!(flow_with_metadata(backend.clone()).grade(request).await);

    assert_eq!(result.processing_method, ProcessingMethod::VisionPrimary);
    assert_eq!(result.score, Score::Fraction { earned: 3.0, total: 4.0 });
    let name = result.student_name_info.as_ref().unwrap();
    assert_eq!(name.value(), Some("John Smith"));
    assert_eq!(name.source, MetadataSource::Corner);
    assert!(result.diagnostics.corner_text.is_some());
    assert!(result.formatted_feedback.contains("**MCQ Analysis:** Q1: B"));
    // 视觉评分没有提取文本，不调用 OCR、姓名、标题
    assert_eq!(backend.calls(), vec!["classify", "vision_grade", "corner"]);
}

#[tokio::test]
async fn test_vision_failure_falls_back_to_ocr() {
    let backend = ScriptedBackend::new()
        .reply("classify", Reply::ok(scan_reply(4, 0)))
        .reply("vision_grade", Reply::Fail)
        .reply("ocr", Reply::ok("1. B\n2. A\n3. C\n4. D"))
        .reply("text_grade", Reply::ok(r#"{"score": "3/4", "feedback": "One wrong."}"#))
        .build();
    let request = GradingRequest::new("Quiz", SubmissionInput::image(image(3)), "B A C C");

    let result = assert_ok!(flow(backend).grade(request).await);

    assert_eq!(result.processing_method, ProcessingMethod::FallbackOcr);
    assert!(result.diagnostics.fallback_reason.is_some());
    assert_eq!(result.score, Score::Fraction { earned: 3.0, total: 4.0 });
    let extracted = result.extracted_text.unwrap();
    assert!(extracted.starts_with("**STUDENT: [Name not detected]**\n**ASSIGNMENT: [Title not detected]**\n\n"));
    assert!(extracted.ends_with("4. D"));
}

#[tokio::test]
async fn test_hybrid_combines_visual_and_text() {
    let backend = ScriptedBackend::new()
        .reply("classify", Reply::ok(scan_reply(1, 3)))
        .reply(
            "vision_partial",
            Reply::ok(r#"{"visual_score": "1/1", "visual_feedback": "Q1 correct"}"#),
        )
        .reply("ocr", Reply::ok("2. Plants make sugar\n3. Chlorophyll\n4. Oxygen"))
        .reply("text_grade", Reply::ok(r#"{"score": "7/9", "feedback": "Mostly right."}"#))
        .build();
    let request = GradingRequest::new("Quiz", SubmissionInput::image(image(5)), "rubric");

    let result = assert_ok!(flow(backend.clone()).grade(request).await);

    assert_eq!(result.processing_method, ProcessingMethod::Hybrid);
    assert_eq!(result.score.to_string(), "Visual: 1/1, Text: 7/9");
    assert!(result
        .formatted_feedback
        .contains("**MCQ/Visual Elements:** Q1 correct\n\n**Text Elements:** Mostly right."));
    assert_eq!(backend.count("vision_partial"), 1);
    assert_eq!(backend.count("ocr"), 1);
}

#[tokio::test]
async fn test_hybrid_visual_failure_keeps_text_result() {
    let backend = ScriptedBackend::new()
        .reply("classify", Reply::ok(scan_reply(1, 2)))
        .reply("vision_partial", Reply::Fail)
        .reply("ocr", Reply::ok("2. answer\n3. answer"))
        .reply("text_grade", Reply::ok(r#"{"score": "6/8", "feedback": "ok"}"#))
        .build();
    let request = GradingRequest::new("Quiz", SubmissionInput::image(image(5)), "rubric");

    let result = assert_ok!(flow(backend.clone()).grade(request).await);

    assert_eq!(result.processing_method, ProcessingMethod::FallbackOcr);
    assert_eq!(result.score, Score::Fraction { earned: 6.0, total: 8.0 });
    assert_eq!(backend.count("ocr"), 1);
}

#[tokio::test]
async fn test_vision_primary_detailed_reply_gets_mcq_full_credit() {
    let backend = ScriptedBackend::new()
        .reply("classify", Reply::ok(scan_reply(3, 0)))
        .reply(
            "vision_grade",
            Reply::ok(
                r#"{"total_score": "0/5", "questions": [
                    {"question_number": 1, "points_earned": 0, "points_possible": 5,
                     "student_answer": "B", "correct_answer": "B", "is_correct": false}]}"#,
            ),
        )
        .build();
    let request = GradingRequest::new("Quiz", SubmissionInput::image(image(4)), "Q1: B");

    let result = assert_ok!(flow(backend.clone()).grade(request).await);

    assert_eq!(result.processing_method, ProcessingMethod::VisionPrimary);
    assert_eq!(result.score, Score::Fraction { earned: 5.0, total: 5.0 });
    assert_eq!(result.diagnostics.mcq_adjustments, 1);
    match &result.feedback {
        Feedback::Structured(s) => {
            assert_eq!(s.total_score, "5/5");
            assert_eq!(s.questions[0].points_earned, 5.0);
        }
        other => panic!("unexpected feedback: {other:?}"),
    }
    assert_eq!(backend.calls(), vec!["classify", "vision_grade"]);
}

#[tokio::test]
async fn test_hybrid_text_failure_keeps_visual_score() {
    let backend = ScriptedBackend::new()
        .reply("classify", Reply::ok(scan_reply(1, 3)))
        .reply(
            "vision_partial",
            Reply::ok(r#"{"visual_score": "1/1", "visual_feedback": "Q1 correct"}"#),
        )
        .reply("ocr", Reply::ok("2. answer\n3. answer\n4. answer"))
        .reply("text_grade", Reply::ok(r#"{"score": "12/10", "feedback": "too generous"}"#))
        .build();
    let request = GradingRequest::new("Quiz", SubmissionInput::image(image(6)), "rubric");

    let result = assert_ok!(flow(backend.clone()).grade(request).await);

    assert_eq!(result.processing_method, ProcessingMethod::Hybrid);
    assert_eq!(result.score.to_string(), "Visual: 1/1, Text: Error");
    assert!(result.is_degraded());
    assert_eq!(result.diagnostics.error_kind.as_deref(), Some("InvalidScoreFormat"));
    assert!(result.formatted_feedback.contains("**MCQ/Visual Elements:** Q1 correct"));
    assert!(result.extracted_text.is_some());
    // 文本部分失败不会重新走 OCR
    assert_eq!(
        backend.calls(),
        vec!["classify", "vision_partial", "ocr", "text_grade"]
    );
}

#[tokio::test]
async fn test_empty_ocr_cannot_be_processed() {
    let backend = ScriptedBackend::new()
        .reply("classify", Reply::ok(scan_reply(0, 4)))
        .reply("ocr", Reply::ok("[No text detected in the image]"))
        .build();
    let request = GradingRequest::new("Essay", SubmissionInput::image(image(1)), "rubric");

    let result = assert_ok!(flow(backend.clone()).grade(request).await);

    assert_eq!(result.processing_method, ProcessingMethod::Unprocessed);
    assert_eq!(result.score, Score::Error);
    assert_eq!(
        result.diagnostics.error_kind.as_deref(),
        Some("ExtractionFailure")
    );
    assert!(result.formatted_feedback.contains("Could not extract any text"));
    assert_eq!(backend.count("text_grade"), 0);
}

#[tokio::test]
async fn test_garbled_classification_defaults_to_ocr() {
    let backend = ScriptedBackend::new()
        .reply("classify", Reply::ok("Sorry, I can't analyze this image."))
        .reply("ocr", Reply::ok("The mitochondria is the powerhouse of the cell."))
        .reply("text_grade", Reply::ok(r#"{"score": 70, "feedback": "Brief."}"#))
        .build();
    let request = GradingRequest::new("Essay", SubmissionInput::image(image(9)), "rubric");

    let result = assert_ok!(flow(backend).grade(request).await);

    assert_eq!(result.processing_method, ProcessingMethod::OcrPrimary);
    let analysis = result.diagnostics.content_analysis.unwrap();
    assert_eq!(analysis.confidence.name(), "low");
    assert_eq!(result.score, Score::Numeric(70.0));
}

#[tokio::test]
async fn test_hanging_calls_time_out_into_a_result() {
    let scripted = ScriptedBackend::new()
        .reply("classify", Reply::Hang)
        .reply("ocr", Reply::Hang)
        .build();
    let guarded: Arc<dyn ChatBackend> = Arc::new(GuardedBackend::with_limits(
        scripted.clone(),
        Duration::from_millis(50),
        1,
        Duration::from_millis(1),
    ));
    let flow = GradingFlow::new(guarded, &test_config());
    let request = GradingRequest::new("Essay", SubmissionInput::image(image(2)), "rubric");

    let result = assert_ok!(
        tokio::time::timeout(Duration::from_secs(5), flow.grade(request))
            .await
            .expect("grading must not hang")
    );

    assert_eq!(result.score, Score::Error);
    assert_eq!(result.processing_method, ProcessingMethod::Unprocessed);
    assert_eq!(
        result.diagnostics.error_kind.as_deref(),
        Some("ExternalServiceFailure")
    );
    // 超时可重试：每个调用各 2 次
    assert_eq!(scripted.count("classify"), 2);
    assert_eq!(scripted.count("ocr"), 2);
}

#[tokio::test]
async fn test_multi_page_preserves_page_order() {
    let backend = ScriptedBackend::new()
        .reply("classify", Reply::ok("{}"))
        .respond_with("ocr", |request| {
            let page = request.images[0][0];
            // 第一页最慢，结果仍按页码排列
            let delay = Duration::from_millis(u64::from(4 - page) * 40);
            Reply::Delayed(delay, format!("Name: Page Student\nPAGE-{} work", page))
        })
        .respond_with("text_grade", |request| {
            let page = (1..=3)
                .find(|p| request.prompt.contains(&format!("PAGE-{} work", p)))
                .unwrap_or(0);
            Reply::ok(format!(
                r#"{{"score": "{page}/5", "feedback": "feedback for page {page}"}}"#
            ))
        })
        .reply("title", Reply::ok(r#"{"assignment_title": null}"#))
        .build();
    let submission = SubmissionInput::pages(vec![image(1), image(2), image(3)]);
    let request = GradingRequest::new("Essay", submission, "rubric").with_label("carol");

    let result = assert_ok!(flow_with_metadata(backend.clone()).grade(request).await);

    assert_eq!(result.processing_method, ProcessingMethod::MultiPage);
    assert_eq!(result.diagnostics.page_count, Some(3));
    assert_eq!(result.score.to_string(), "Page 1: 1/5, Page 2: 2/5, Page 3: 3/5");

    let text = &result.formatted_feedback;
    let p1 = text.find("**Page 1:**").unwrap();
    let p2 = text.find("**Page 2:**").unwrap();
    let p3 = text.find("**Page 3:**").unwrap();
    assert!(p1 < p2 && p2 < p3);
    assert!(text.starts_with("**STUDENT: PAGE STUDENT**\n"));

    let extracted = result.extracted_text.unwrap();
    assert!(extracted.find("PAGE-1").unwrap() < extracted.find("PAGE-3").unwrap());
    assert_eq!(backend.count("ocr"), 3);
}

#[tokio::test]
async fn test_pdf_without_pages_cannot_be_processed() {
    let backend = ScriptedBackend::new().build();
    let submission = SubmissionInput::Pdf {
        bytes: vec![0x25; 512],
        page_images: Vec::new(),
    };
    let request = GradingRequest::new("Essay", submission, "rubric");

    let result = assert_ok!(flow(backend.clone()).grade(request).await);

    assert_eq!(result.processing_method, ProcessingMethod::Unprocessed);
    assert_eq!(result.score, Score::Error);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_result_serialization_shape() {
    let backend = ScriptedBackend::new()
        .reply("text_grade", Reply::ok(r#"{"score": "9/10", "feedback": "Good."}"#))
        .build();
    let request = GradingRequest::new("Essay", SubmissionInput::text("essay"), "rubric");
    let result = assert_ok!(flow(backend).grade(request).await);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["score"], "9/10");
    assert_eq!(json["processing_method"], "Text Submission");
    assert!(json["feedback"].as_str().unwrap().contains("Good."));
    assert!(json["formatted_feedback"].is_string());
    assert!(json["graded_at"].is_string());
}

#[tokio::test]
#[ignore] // 需要真实的 API Key：cargo test -- --ignored
async fn test_live_text_grading() {
    let _ = tracing_subscriber::fmt::try_init();

    let config = assignment_grader::Config::from_env();
    let backend: Arc<dyn ChatBackend> = Arc::new(GuardedBackend::new(
        assignment_grader::LlmClient::new(&config),
        &config,
    ));
    let flow = GradingFlow::new(backend, &config);
    let request = GradingRequest::new(
        "Math",
        SubmissionInput::text("Name: Test Student\n2x + 5 = 13\n2x = 8\nx = 4"),
        "Solve 2x + 5 = 13 (10 points)",
    );

    let result = flow.grade(request).await.expect("评分失败");
    println!("{}", result.formatted_feedback);
    assert!(!result.is_degraded());
}
