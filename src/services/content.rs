use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::interview::{Difficulty, InterviewQuestion, QuestionType};

/// Source of interview preparation questions.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn interview_questions(
        &self,
        job_title: &str,
        skills: &[String],
    ) -> Result<Vec<InterviewQuestion>, ContentError>;
}

/// Built-in question set personalised with the job title and first skill.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn questions(job_title: &str, skills: &[String]) -> Vec<InterviewQuestion> {
        use Difficulty::*;
        use QuestionType::*;

        let skill = skills
            .first()
            .map(String::as_str)
            .unwrap_or("relevant technologies");

        vec![
            InterviewQuestion::new("Tell me about yourself and your background.", Behavioral, Easy),
            InterviewQuestion::new(
                format!("What interests you about this {job_title} position?"),
                Behavioral,
                Easy,
            ),
            InterviewQuestion::new("Describe a challenging project you've worked on.", Behavioral, Medium),
            InterviewQuestion::new("How do you handle tight deadlines and pressure?", Behavioral, Medium),
            InterviewQuestion::new("Where do you see yourself in 5 years?", Behavioral, Easy),
            InterviewQuestion::new(format!("Explain your experience with {skill}."), Technical, Medium),
            InterviewQuestion::new("How do you stay updated with industry trends?", Technical, Easy),
            InterviewQuestion::new("Describe your approach to debugging complex issues.", Technical, Medium),
            InterviewQuestion::new("What's your experience with version control systems?", Technical, Easy),
            InterviewQuestion::new("How would you optimize application performance?", Technical, Hard),
            InterviewQuestion::new(
                "If you disagreed with a team decision, how would you handle it?",
                Situational,
                Medium,
            ),
            InterviewQuestion::new("How would you handle a project with unclear requirements?", Situational, Medium),
            InterviewQuestion::new(
                "Describe a time you had to learn a new technology quickly.",
                Situational,
                Medium,
            ),
            InterviewQuestion::new("How do you prioritize tasks when everything is urgent?", Situational, Hard),
            InterviewQuestion::new(
                "What would you do if you made a critical mistake in production?",
                Situational,
                Hard,
            ),
        ]
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn interview_questions(
        &self,
        job_title: &str,
        skills: &[String],
    ) -> Result<Vec<InterviewQuestion>, ContentError> {
        Ok(Self::questions(job_title, skills))
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// Any failure (transport, status, unparseable reply) degrades to the
/// template questions; the error is logged, never returned.
pub struct ChatCompletionGenerator {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatCompletionGenerator {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, ContentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(ContentError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    async fn request_questions(
        &self,
        job_title: &str,
        skills: &[String],
    ) -> Result<Vec<InterviewQuestion>, ContentError> {
        let url = format!("{}/chat/completions", self.base_url);

        let prompt = format!(
            "Generate 15 interview questions for a {job_title} position. Skills required: {}.\n\n\
             Include:\n- 5 technical questions\n- 5 behavioral questions\n- 5 situational questions\n\n\
             Format as JSON array with objects containing: question, type, difficulty",
            skills.join(", ")
        );

        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are an expert technical interviewer. Generate challenging but fair interview questions."
                },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.8,
            "max_tokens": 1500
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(ContentError::Http)?
            .error_for_status()
            .map_err(ContentError::Http)?;

        let chat: ChatResponse = response.json().await.map_err(ContentError::Http)?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ContentError::EmptyReply)?;

        parse_question_array(&content)
    }
}

#[async_trait]
impl ContentGenerator for ChatCompletionGenerator {
    async fn interview_questions(
        &self,
        job_title: &str,
        skills: &[String],
    ) -> Result<Vec<InterviewQuestion>, ContentError> {
        match self.request_questions(job_title, skills).await {
            Ok(questions) if !questions.is_empty() => Ok(questions),
            Ok(_) => {
                tracing::warn!(job_title, "Chat completion returned no questions, using templates");
                Ok(TemplateGenerator::questions(job_title, skills))
            }
            Err(e) => {
                tracing::warn!(job_title, error = %e, "Chat completion failed, using templates");
                Ok(TemplateGenerator::questions(job_title, skills))
            }
        }
    }
}

/// Parse the outermost `[...]` span of a model reply as a question list.
pub fn parse_question_array(content: &str) -> Result<Vec<InterviewQuestion>, ContentError> {
    let (Some(start), Some(end)) = (content.find('['), content.rfind(']')) else {
        return Err(ContentError::EmptyReply);
    };
    if end < start {
        return Err(ContentError::EmptyReply);
    }
    serde_json::from_str(&content[start..=end]).map_err(ContentError::Parse)
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Reply contained no question list")]
    EmptyReply,

    #[error("Failed to parse questions: {0}")]
    Parse(#[from] serde_json::Error),
}
