//! The four pipeline stages: extract-problem, generate-solution,
//! debug-from-screenshots, refine-solution. Each stage is one network round
//! trip against a [`CompletionBackend`] plus response extraction; progress
//! reporting and state ownership live in the orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::ProcessingError;
use crate::extract;
use crate::provider::{CompletionBackend, CompletionRequest};

/// Structured problem description recovered from screenshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemInfo {
    pub problem_statement: String,
    #[serde(default)]
    pub constraints: Option<String>,
    #[serde(default)]
    pub example_input: Option<String>,
    #[serde(default)]
    pub example_output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolutionResult {
    pub code: String,
    #[serde(default)]
    pub thoughts: Vec<String>,
    #[serde(default)]
    pub time_complexity: String,
    #[serde(default)]
    pub space_complexity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_analysis: Option<String>,
}

/// One captured screenshot, read fresh from disk per invocation.
#[derive(Debug, Clone)]
pub struct ScreenshotInput {
    pub path: PathBuf,
    pub preview: String,
    /// Base64-encoded PNG bytes.
    pub data: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationFocus {
    Time,
    Space,
    Both,
}

fn or_default<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value.as_deref().filter(|v| !v.is_empty()).unwrap_or(default)
}

pub(crate) fn extraction_prompt(language: &str) -> String {
    format!(
        "Extract the coding problem details from these screenshots. Return in JSON format. \
         Preferred coding language we gonna use for this problem is {}.",
        language
    )
}

pub(crate) const EXTRACTION_INSTRUCTION: &str =
    "You are a coding challenge interpreter. Analyze the screenshot of the coding problem \
     and extract all relevant information. Return the information in JSON format with these \
     fields: problem_statement, constraints, example_input, example_output. Just return the \
     structured JSON without any other text.";

pub(crate) fn solution_prompt(problem: &ProblemInfo, language: &str) -> String {
    format!(
        "Generate a detailed solution for the following coding problem:\n\n\
PROBLEM STATEMENT:\n{}\n\n\
CONSTRAINTS:\n{}\n\n\
EXAMPLE INPUT:\n{}\n\n\
EXAMPLE OUTPUT:\n{}\n\n\
LANGUAGE: {}\n\n\
I need the response in the following format:\n\
1. Code: A clean, optimized implementation in {}\n\
2. Your Thoughts: A list of key insights and reasoning behind your approach\n\
3. Time complexity: O(X) with a detailed explanation (at least 2-3 sentences)\n\
4. Space complexity: O(X) with a detailed explanation (at least 2-3 sentences)\n\n\
IMPORTANT: For complexity explanations, you MUST be thorough and explain the reasoning. \
The explanations are critical and must include:\n\
- The Big O notation (e.g., O(n), O(log n), O(n\u{b2}))\n\
- Why this complexity applies to the solution\n\
- Any relevant details about best/worst/average cases\n\
- Comparison with other potential approaches if relevant\n\n\
Examples of good complexity explanations:\n\
- \"Time complexity: O(n) because we iterate through the array only once. This is optimal \
as we need to examine each element at least once to find the solution. The operations \
inside the loop are all O(1).\"\n\
- \"Space complexity: O(n) because in the worst case, we store all elements in the hashmap. \
The additional space scales linearly with the input size. We cannot reduce this further \
while maintaining the O(n) time complexity.\"\n\n\
Your solution should be efficient, well-commented, and handle edge cases.",
        problem.problem_statement,
        or_default(&problem.constraints, "No specific constraints provided."),
        or_default(&problem.example_input, "No example input provided."),
        or_default(&problem.example_output, "No example output provided."),
        language,
        language,
    )
}

pub(crate) fn debug_prompt(
    problem: &ProblemInfo,
    current: &SolutionResult,
    language: &str,
) -> String {
    format!(
        "You are a coding interview assistant helping debug and improve solutions. Analyze \
these screenshots which include either error messages, incorrect outputs, or test cases, \
and provide detailed debugging help.\n\n\
PROBLEM STATEMENT:\n{}\n\n\
CONSTRAINTS:\n{}\n\n\
CURRENT SOLUTION:\n```{}\n{}\n```\n\n\
CURRENT TIME COMPLEXITY: {}\n\
CURRENT SPACE COMPLEXITY: {}\n\n\
Please provide a comprehensive debugging analysis, including:\n\
1. Identify any bugs, logical errors, or edge cases that the current solution fails to handle\n\
2. Explain why these issues occur\n\
3. Provide a corrected implementation\n\
4. Include time and space complexity analysis of the corrected solution\n\n\
Format the response as follows:\n\
1. Debug Analysis: A detailed explanation of issues found\n\
2. Corrected Code: The improved implementation in {}\n\
3. Time complexity: O(X) with a detailed explanation (at least 2 sentences)\n\
4. Space complexity: O(X) with a detailed explanation (at least 2 sentences)\n\n\
Your debugging should be thorough and educational, explaining the reasoning behind your changes.",
        problem.problem_statement,
        or_default(&problem.constraints, "No specific constraints provided."),
        language,
        current.code,
        if current.time_complexity.is_empty() { "Unknown" } else { &current.time_complexity },
        if current.space_complexity.is_empty() { "Unknown" } else { &current.space_complexity },
        language,
    )
}

pub(crate) fn refinement_prompt(
    problem: &ProblemInfo,
    current: &SolutionResult,
    focus: OptimizationFocus,
    instruction: Option<&str>,
    language: &str,
) -> String {
    let goal = match (instruction, focus) {
        (Some(text), _) if !text.trim().is_empty() => text.trim().to_string(),
        (_, OptimizationFocus::Time) => {
            "Optimize the solution for better time complexity.".to_string()
        }
        (_, OptimizationFocus::Space) => {
            "Optimize the solution for better space complexity.".to_string()
        }
        (_, OptimizationFocus::Both) => "Optimize the solution for better performance.".to_string(),
    };

    format!(
        "I need to optimize my solution to the following coding problem:\n\n\
PROBLEM STATEMENT:\n{}\n\n\
CONSTRAINTS:\n{}\n\n\
CURRENT SOLUTION:\n```{}\n{}\n```\n\n\
CURRENT TIME COMPLEXITY: {}\n\
CURRENT SPACE COMPLEXITY: {}\n\n\
{}\n\n\
I need the optimized response in the following format:\n\
1. Code: A clean, optimized implementation in {}\n\
2. Your Thoughts: A list of key insights about the optimization approach\n\
3. Time complexity: O(X) with a detailed explanation (at least 2-3 sentences)\n\
4. Space complexity: O(X) with a detailed explanation (at least 2-3 sentences)\n\n\
IMPORTANT: For complexity explanations, you MUST be thorough and explain the reasoning. \
The explanations are critical and must include:\n\
- The Big O notation (e.g., O(n), O(log n), O(n\u{b2}))\n\
- Why this complexity applies to the solution\n\
- Any relevant details about best/worst/average cases\n\
- A comparison with the original solution's complexity\n\n\
Examples of good complexity explanations:\n\
- \"Time complexity: O(n) because we iterate through the array only once. This is optimal \
as we need to examine each element at least once to find the solution. This improves over \
the original O(n\u{b2}) solution by eliminating the nested loop.\"\n\
- \"Space complexity: O(log n) because we're using recursion with a divide-and-conquer \
approach. The maximum recursion depth is logarithmic to the input size. This is more \
efficient than the original solution that used O(n) extra space.\"\n\n\
Your solution should be efficient, well-commented, and handle edge cases.",
        problem.problem_statement,
        or_default(&problem.constraints, "No specific constraints provided."),
        language,
        current.code,
        current.time_complexity,
        current.space_complexity,
        goal,
        language,
    )
}

/// Extract the structured problem description from screenshots. The backend
/// is instructed to answer with strict JSON; stray code fences are stripped
/// defensively before parsing.
pub async fn extract_problem(
    backend: &dyn CompletionBackend,
    config: &AppConfig,
    screenshots: &[ScreenshotInput],
    language: &str,
    cancel: &CancellationToken,
) -> Result<ProblemInfo, ProcessingError> {
    let request = CompletionRequest::new(
        config.model_for(&config.extraction_model),
        EXTRACTION_INSTRUCTION.to_string(),
        extraction_prompt(language),
    )
    .with_images(screenshots.iter().map(|s| s.data.clone()).collect());

    let response = backend.complete(&request, cancel).await?;

    let json_text = extract::strip_json_fences(&response);
    serde_json::from_str(&json_text).map_err(|e| {
        log::error!("Failed to parse problem extraction response: {}", e);
        ProcessingError::ExtractionParse(e.to_string())
    })
}

/// Generate the initial solution for a previously extracted problem.
pub async fn generate_solution(
    backend: &dyn CompletionBackend,
    config: &AppConfig,
    problem: &ProblemInfo,
    language: &str,
    cancel: &CancellationToken,
) -> Result<SolutionResult, ProcessingError> {
    let request = CompletionRequest::new(
        config.model_for(&config.solution_model),
        "You are an expert coding interview assistant. Provide clear, optimal solutions \
         with detailed explanations."
            .to_string(),
        solution_prompt(problem, language),
    );

    let response = backend.complete(&request, cancel).await?;
    log::debug!("Raw solution response: {}", response);

    let code = extract::code_block(&response).unwrap_or_else(|| response.trim().to_string());
    let thoughts = extract::thoughts(&response).unwrap_or_else(|| {
        vec!["Solution approach based on efficiency and readability".to_string()]
    });
    let (time_complexity, space_complexity) =
        extract::complexities(&response, extract::ComplexityFallback::generic());

    Ok(SolutionResult {
        code,
        thoughts,
        time_complexity,
        space_complexity,
        debug_analysis: None,
    })
}

/// Debug the current solution against new screenshots (error output, failing
/// tests). A missing code fence means the model offered no correction; the
/// prior code is kept and only the analysis changes.
pub async fn debug_solution(
    backend: &dyn CompletionBackend,
    config: &AppConfig,
    problem: &ProblemInfo,
    current: &SolutionResult,
    screenshots: &[ScreenshotInput],
    language: &str,
    cancel: &CancellationToken,
) -> Result<SolutionResult, ProcessingError> {
    if current.code.trim().is_empty() {
        return Err(ProcessingError::MissingPriorSolution);
    }

    let request = CompletionRequest::new(
        config.model_for(&config.debugging_model),
        "You are an expert coding interview assistant focused on debugging and improving \
         solutions."
            .to_string(),
        debug_prompt(problem, current, language),
    )
    .with_images(screenshots.iter().map(|s| s.data.clone()).collect());

    let response = backend.complete(&request, cancel).await?;
    log::debug!("Raw debugging response: {}", response);

    let code = extract::code_block(&response).unwrap_or_else(|| current.code.clone());
    let (time_complexity, space_complexity) = extract::complexities(
        &response,
        extract::ComplexityFallback {
            time: current.time_complexity.clone(),
            space: current.space_complexity.clone(),
        },
    );

    Ok(SolutionResult {
        code,
        // Reasoning is surfaced through the full analysis text instead.
        thoughts: Vec::new(),
        time_complexity,
        space_complexity,
        debug_analysis: Some(response),
    })
}

/// Refine a working solution toward a complexity goal.
pub async fn refine_solution(
    backend: &dyn CompletionBackend,
    config: &AppConfig,
    problem: &ProblemInfo,
    current: &SolutionResult,
    focus: OptimizationFocus,
    instruction: Option<&str>,
    language: &str,
    cancel: &CancellationToken,
) -> Result<SolutionResult, ProcessingError> {
    if current.code.trim().is_empty() {
        return Err(ProcessingError::MissingPriorSolution);
    }

    let request = CompletionRequest::new(
        config.model_for(&config.solution_model),
        "You are an expert coding interview assistant specializing in algorithm \
         optimization. You provide clear, optimal solutions with detailed explanations \
         about complexity improvements."
            .to_string(),
        refinement_prompt(problem, current, focus, instruction, language),
    );

    let response = backend.complete(&request, cancel).await?;
    log::debug!("Raw refinement response: {}", response);

    let code = extract::code_block(&response).unwrap_or_else(|| response.trim().to_string());
    let thoughts = extract::thoughts(&response).unwrap_or_else(|| {
        vec!["Optimization approach based on efficiency and improved complexity".to_string()]
    });
    let (time_complexity, space_complexity) = extract::complexities(
        &response,
        extract::ComplexityFallback {
            time: current.time_complexity.clone(),
            space: current.space_complexity.clone(),
        },
    );

    Ok(SolutionResult {
        code,
        thoughts,
        time_complexity,
        space_complexity,
        debug_analysis: None,
    })
}
