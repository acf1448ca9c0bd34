//! Structured activity generation via forced tool calling.
//!
//! The model is given one tool whose JSON-Schema parameters mirror the
//! activity shape the frontend consumes; deserializing the returned
//! arguments into [`GeneratedActivity`] is the validation step.

use serde::{Deserialize, Serialize};

use crate::tutor::llm::ToolDefinition;

/// System prompt for the activity-generation flow.
pub const ACTIVITY_GENERATION_SYSTEM: &str = "\
You are an expert computer science educator specializing in creating programming exercises.
Your task is to generate high-quality coding activities for students learning Python.

When creating activities:
- Make problem statements clear and educational
- Include realistic examples with input/output
- Write starter code that guides without solving
- Create comprehensive test cases (visible and hidden)
- Provide progressive hints that don't give away the solution
- Use proper Markdown formatting for problem statements
- Ensure test cases actually validate the solution

Generate activities appropriate for the requested difficulty level and topic.";

/// One generated test case. Field names are the frontend's contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedTestCase {
    pub name: String,
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: bool,
}

/// A complete generated activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedActivity {
    pub title: String,
    pub description: String,
    /// Markdown problem statement.
    pub problem_statement: String,
    pub starter_code: String,
    pub test_cases: Vec<GeneratedTestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<String>>,
}

impl GeneratedActivity {
    /// Minimum test cases an activity must ship with.
    pub const MIN_TEST_CASES: usize = 2;

    /// Parse and validate the tool-call arguments returned by the model.
    pub fn from_tool_arguments(arguments: &str) -> Result<Self, ActivityParseError> {
        let activity: GeneratedActivity = serde_json::from_str(arguments)?;
        if activity.test_cases.len() < Self::MIN_TEST_CASES {
            return Err(ActivityParseError::TooFewTestCases {
                got: activity.test_cases.len(),
            });
        }
        Ok(activity)
    }
}

/// Why generated activity arguments were rejected.
#[derive(Debug, thiserror::Error)]
pub enum ActivityParseError {
    #[error("failed to parse activity arguments: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "activity has {got} test cases, at least {} required",
        GeneratedActivity::MIN_TEST_CASES
    )]
    TooFewTestCases { got: usize },
}

/// The single tool offered for activity generation.
pub fn activity_generation_tool() -> ToolDefinition {
    ToolDefinition {
        name: "generate_coding_activity".to_string(),
        description: "Generate a structured coding activity with problem statement, \
                      starter code, test cases, and hints"
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Concise activity title (e.g., 'Binary Search Algorithm')"
                },
                "description": {
                    "type": "string",
                    "description": "Brief one-sentence description of what students will learn"
                },
                "problemStatement": {
                    "type": "string",
                    "description": "Detailed problem statement in Markdown format. Include: problem description, examples with input/output, and requirements."
                },
                "starterCode": {
                    "type": "string",
                    "description": "Python starter code with function signature and basic structure. Should guide students but not solve the problem."
                },
                "testCases": {
                    "type": "array",
                    "description": "Array of test cases to validate the solution",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {
                                "type": "string",
                                "description": "Descriptive name for the test case"
                            },
                            "input": {
                                "type": "string",
                                "description": "Input parameters as a string (e.g., '5, 3' or '[1,2,3]')"
                            },
                            "expectedOutput": {
                                "type": "string",
                                "description": "Expected output as a string"
                            },
                            "isHidden": {
                                "type": "boolean",
                                "description": "Whether this test case should be hidden from students",
                                "default": false
                            }
                        },
                        "required": ["name", "input", "expectedOutput"]
                    },
                    "minItems": 2
                },
                "hints": {
                    "type": "array",
                    "description": "Optional array of progressive hints to help students",
                    "items": { "type": "string" }
                }
            },
            "required": ["title", "description", "problemStatement", "starterCode", "testCases"]
        }),
    }
}
