//! 提示词目录
//!
//! 所有发往模型的提示词都在这里构建，调用方只关心参数

use crate::models::{AssignmentType, OcrVariant};

/// 文本评分的系统消息
pub const GRADING_SYSTEM_PROMPT: &str =
    "You are an expert grading assistant that evaluates student work based on provided rubrics. \
     Always answer with a single JSON object.";

/// OCR 结果为空时模型返回的标记
pub const NO_TEXT_MARKER: &str = "[No text detected in the image]";

/// 取前 n 个字符（按字符而不是字节）
pub fn head_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 内容分类
pub const CONTENT_SCAN_PROMPT: &str = r#"Analyze this image comprehensively and detect all content types, with special focus on MCQ answer selections:

**PRIMARY SCAN FOR:**
1. **Multiple Choice Questions (MCQs)** - Questions with A/B/C/D options
   - Look for student selections: bubbled circles, checkmarks, circled letters, highlighted options
   - Identify the selected answer for each MCQ
2. **Diagram-based questions** - Math graphs, science diagrams, charts, visual problems
3. **Pure text content** - Essays, short answers, written responses without visual elements

**MCQ ANSWER DETECTION:**
For each MCQ found, identify:
- Question number/identifier
- Available options (A, B, C, D)
- Student's selected answer (bubbles, checkmarks, circles, highlighting)
- Confidence level in answer detection

List every question exactly once, in one of the three lists.

Respond in JSON format:
{
    "mcq_questions": [
        {
            "question_id": "Q1",
            "student_answer": "B",
            "options": ["A", "B", "C", "D"],
            "answer_confidence": "high",
            "selection_method": "bubbled_circle"
        }
    ],
    "diagram_questions": [
        {
            "question_id": "Q2",
            "location": "middle_section",
            "description": "Graph interpretation question"
        }
    ],
    "text_questions": [
        {
            "question_id": "Q3",
            "type": "short_answer",
            "location": "bottom_section"
        }
    ],
    "confidence": "high/medium/low",
    "visual_percentage": 67
}"#;

const OCR_DOCUMENT_PROMPT: &str = r#"Please analyze this document image and extract ALL text content with maximum accuracy, with special attention to the top of the page where student information appears.

**STUDENT IDENTIFICATION - HIGHEST PRIORITY:**
1. Examine the TOP of the document FIRST, especially top corners, headers and margins
2. Look for any text that appears to be a student name, labeled ("Name: ...") or not
3. Place this information at the beginning of your response

**DOCUMENT PROCESSING INSTRUCTIONS:**
1. Extract every piece of text visible in the document
2. Maintain the original structure and formatting as much as possible
3. Include headers, body text, mathematical expressions, and any annotations
4. For handwritten content, provide your best interpretation
5. For mathematical work, extract all steps, calculations, and final answers
6. For multiple choice questions, identify both the questions and any selected answers
7. Indicate any unclear or ambiguous text with [unclear: best guess]

If no text is found, respond with '[No text detected in the image]'.

Extract ALL visible text from this document image:"#;

const OCR_MATH_CHOICE_PROMPT: &str = r#"Please analyze this image and extract all text content with special attention to OCR accuracy, student identification, and student work.

**STUDENT IDENTIFICATION - HIGHEST PRIORITY:**
1. Look CAREFULLY at the top of the page for the student's name, especially in corners
2. Include this information FIRST in your response, even without explicit labels
3. Even if the name is handwritten and somewhat unclear, include your best interpretation

**CRITICAL OCR INSTRUCTIONS:**
1. Be very forgiving of handwriting variations and unclear text
2. When text is ambiguous, provide your best interpretation in brackets [like this]
3. Pay special attention to mathematical symbols, numbers, and final answers
4. For multiple-choice questions, carefully identify student selections (bubbled circles, checkmarks, circled letters)

**WORK ANALYSIS:**
1. Extract all visible steps and calculations
2. Identify final answers clearly
3. Be generous in interpreting mathematical notation

Format your response as:
- First, any student identification information (name)
- Next, all the extracted text as it appears
- Then:

[MULTIPLE CHOICE ANALYSIS] (if applicable)
Question 1: [question text]
Choices: A) ..., B) ..., C) ..., D) ...
Student Selected: [letter(s) that appear to be marked]

[FINAL ANSWERS DETECTED]
- Problem 1: [final answer]

If no text is found, respond with '[No text detected in the image]'."#;

const OCR_GENERAL_PROMPT: &str = r#"Please extract all text from this image with MAXIMUM OCR error tolerance, focusing on student identification and content.

**STUDENT IDENTIFICATION - HIGHEST PRIORITY:**
1. Carefully inspect the TOP of the document, especially CORNERS, for the student name
2. Even if there's no label explicitly saying "Name", if you see what looks like a name, include it

**ULTRA-LENIENT INSTRUCTIONS:**
1. Be extremely forgiving of unclear handwriting
2. Guess at ambiguous text and mark with [interpreted: text]
3. Focus on extracting key content rather than perfect formatting

Format your response as:
[STUDENT INFORMATION]
Name: [Student name if found, or "Not clearly identified"]
Assignment: [Title or topic if identifiable]

[EXTRACTED TEXT]

[KEY ANSWERS/CONCLUSIONS DETECTED]
- [any identifiable final answers or main points]

If no text is found, respond with '[No text detected in the image]'."#;

/// OCR 提取
pub fn ocr_prompt(variant: OcrVariant) -> &'static str {
    match variant {
        OcrVariant::Document => OCR_DOCUMENT_PROMPT,
        OcrVariant::MathOrChoice => OCR_MATH_CHOICE_PROMPT,
        OcrVariant::General => OCR_GENERAL_PROMPT,
    }
}

/// 视觉模型整体评分
pub fn vision_grading_prompt(
    assignment_type: &AssignmentType,
    rubric: &str,
    analysis_json: &str,
    mcq_json: &str,
) -> String {
    format!(
        r#"Grade this assignment directly from the image with SPECIAL EMPHASIS on MCQ grading rules.

ASSIGNMENT TYPE: {assignment_type}

RUBRIC:
{rubric}

CONTENT ANALYSIS:
{analysis_json}

**CRITICAL MCQ GRADING RULES:**
1. **MCQ Full Credit Rule**: if the student's selected answer matches the correct answer in the rubric, award FULL CREDIT regardless of work shown
2. **No Work Required**: MCQs do not require calculations or explanations
3. **Binary Scoring**: MCQs are either fully correct (full points) or incorrect (zero points)

**DETECTED MCQ ANSWERS:**
{mcq_json}

**GRADING INSTRUCTIONS:**
1. For each MCQ: compare the student answer with the rubric answer
2. For diagrams: analyze visual content, graphs, charts, mathematical work
3. For text questions: grade on content quality and rubric criteria
4. If the rubric specifies a total other than 100 points, output the score as a fraction (e.g. "8/10"); otherwise output a number from 0 to 100

Respond in JSON format:
{{
    "score": "your_score_here",
    "feedback": "detailed feedback with MCQ analysis",
    "mcq_analysis": "breakdown of each MCQ: student answer vs correct answer"
}}"#
    )
}

/// 视觉模型只评视觉题
pub fn vision_partial_prompt(assignment_type: &AssignmentType, rubric: &str, questions_json: &str) -> String {
    format!(
        r#"Grade ONLY the MCQ and diagram-based questions in this image with MCQ-optimized scoring.

ASSIGNMENT TYPE: {assignment_type}
RUBRIC: {rubric}

VISUAL QUESTIONS TO GRADE:
{questions_json}

**MCQ GRADING RULES:**
1. **Full Credit for Correct Answers**: if the student's selection matches the rubric answer, award full points
2. **No Work Required**: MCQs don't need calculations or explanations
3. **Binary Scoring**: correct = full points, incorrect = zero points

**INSTRUCTIONS:**
1. Focus ONLY on MCQ selections and diagram analysis
2. Ignore text-based questions (graded separately)
3. Give the score for visual elements only, as a fraction "earned/total" of the visual points

Respond in JSON format:
{{
    "visual_score": "score for visual elements only",
    "visual_feedback": "feedback for MCQ/diagram questions",
    "questions_graded": ["list of question IDs graded"]
}}"#
    )
}

/// 文本评分（按作业类型选择详细格式）
pub fn grading_prompt(assignment_type: &AssignmentType, submission: &str, rubric: &str) -> String {
    if assignment_type.is_math_like() {
        math_grading_prompt(assignment_type, submission, rubric)
    } else {
        general_grading_prompt(assignment_type, submission, rubric)
    }
}

fn math_grading_prompt(assignment_type: &AssignmentType, submission: &str, rubric: &str) -> String {
    format!(
        r#"You are an expert mathematics educator grading {assignment_type} assignments with MAXIMUM LENIENCY for OCR-processed work.

**FINAL ANSWER PRIORITY SYSTEM:**
1. Correct final answer = 90-100% credit (even with minimal/unclear work)
2. Close/reasonable final answer = 70-90% credit (assume calculation errors due to OCR)
3. Wrong answer + correct method visible = 60-80% credit
4. Some mathematical attempt = 25-50% credit

**OCR ERROR ASSUMPTIONS:**
- If work appears incomplete, assume the student showed more than OCR captured
- If the final answer is correct, assume the method was largely correct

**MULTIPLE CHOICE SPECIAL RULES:**
- If the correct letter is the student's selection, award full credit
- Don't require work shown for multiple choice questions

RUBRIC:
{rubric}

STUDENT SUBMISSION:
{submission}

Respond in JSON format:
{{
    "total_score": "earned_points/total_points",
    "percentage": "XX%",
    "questions": [
        {{
            "question_number": 1,
            "points_earned": 0,
            "points_possible": 0,
            "student_answer": "[student's final answer]",
            "correct_answer": "[correct answer from rubric]",
            "is_correct": true,
            "grading_rationale": "why these points were awarded",
            "ocr_leniency_applied": false,
            "teacher_comment": "brief comment"
        }}
    ],
    "overall_feedback": {{
        "strengths": ["..."],
        "areas_for_improvement": ["..."],
        "next_steps": "..."
    }},
    "grading_notes": "OCR considerations for the teacher"
}}"#
    )
}

fn general_grading_prompt(assignment_type: &AssignmentType, submission: &str, rubric: &str) -> String {
    let mut prompt = format!(
        r#"You are an expert educator with years of experience grading {assignment_type} assignments.

**CRITICAL OCR TOLERANCE INSTRUCTIONS:**
This submission may have been processed through OCR and may contain errors. Be lenient with:
- Unclear or garbled text
- Missing formatting
- Misinterpreted symbols or characters

GRADING PHILOSOPHY:
- Prioritize content understanding over perfect presentation
- Look for key concepts and ideas even if poorly formatted
- Be generous with partial credit when main ideas are present

RUBRIC:
{rubric}

STUDENT SUBMISSION:
{submission}

Respond in JSON format with this EXACT structure:
{{
    "total_score": "earned_points/total_points",
    "percentage": "XX%",
    "questions": [
        {{
            "question_number": 1,
            "points_earned": 0,
            "points_possible": 0,
            "student_response": "[key parts of student's response]",
            "expected_response": "[what was expected based on rubric]",
            "is_satisfactory": true,
            "mistakes_identified": ["Specific issue"],
            "partial_credit_given_for": ["Correct concept understanding"],
            "teacher_comment": "Brief comment for teacher records"
        }}
    ],
    "overall_feedback": {{
        "strengths": ["Specific strength"],
        "areas_for_improvement": ["Specific area with actionable advice"],
        "next_steps": "Specific recommendations for student improvement"
    }},
    "grading_notes": "Any OCR-related considerations or grading decisions for teacher reference"
}}"#
    );

    if assignment_type.is_choice_like() {
        prompt.push_str(
            r#"

**MULTIPLE CHOICE + OCR GRADING INSTRUCTIONS:**
- For multiple choice questions, include "question_type": "multiple_choice" in the question object
- Add a "student_selection" field with the selected letter and put the correct letter in "expected_response"
- Multiple choice questions do NOT require work shown
- Give benefit of doubt when selections are unclear"#,
        );
    }
    prompt
}

/// 从文本开头提取学生姓名
pub fn student_name_prompt(text: &str) -> String {
    format!(
        r#"Analyze the following text extracted from a student assignment and identify the student's name.

Student names are MOST OFTEN found at the top right or top left of the first page, in the header, or in the first few lines.
Look for "Name: ...", "Student: ...", "By: ...", or a bare full name at the top of the document.
A name is typically 1-3 words; extract it even without an explicit label.

Text to analyze (first portion of assignment):
{}

Respond in JSON format:
{{
    "student_name": "Full Name" or null if no name found,
    "confidence": "high" | "medium" | "low",
    "location": "Description of where the name was found"
}}"#,
        head_chars(text, 1500)
    )
}

/// 从文本开头提取作业标题
pub fn assignment_title_prompt(text: &str) -> String {
    format!(
        r#"Analyze the following text extracted from a student assignment and identify the assignment title.

Look for patterns like "Assignment: ...", "Title: ...", "Subject: ...", "Topic: ...", "Chapter: ...", "Unit: ...",
"Homework #N" or "Quiz #N", or a heading at the top that clearly names the assignment.

Text to analyze:
{}

Respond in JSON format:
{{
    "assignment_title": "Assignment Title" or null if no title found,
    "confidence": "high" | "medium" | "low",
    "location": "Description of where the title was found"
}}"#,
        head_chars(text, 1000)
    )
}

/// 四角文本提取
pub const CORNER_PROMPT: &str = r#"Focus ONLY on the FOUR CORNERS of this image and extract any text found there.

CRITICAL INSTRUCTIONS:
1. ONLY look at the four corner regions (top-left, top-right, bottom-left, bottom-right)
2. Student names are most often in the top-left or top-right corners
3. For each corner, report exactly what text appears there, if any
4. If handwritten, provide your best interpretation
5. Do not analyze the main content of the document

Format your response in this exact JSON structure:
{
    "top_left": "text found in top left corner or null if none",
    "top_right": "text found in top right corner or null if none",
    "bottom_left": "text found in bottom left corner or null if none",
    "bottom_right": "text found in bottom right corner or null if none"
}"#;
