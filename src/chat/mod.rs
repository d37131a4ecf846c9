// Intent-routed chat assistant
// Classifies a question, looks up catalog context when needed, then answers

#[cfg(test)]
mod tests;

use anyhow::Result;
use console::style;
use dialoguer::Input;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::prompts::{
    IntentTarget, QueryIntent, answer_prompt, intent_prompt, parse_json_reply,
};
use crate::llm::{ResponseFormat, SharedModel, run_blocking};
use crate::search::{CourseHit, SemanticSearch, UniversityHit};

pub const APOLOGY: &str =
    "Sorry, I couldn't generate an answer right now. Please try again in a moment.";

const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

/// Catalog records handed to the model alongside the question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    pub universities: Vec<UniversityHit>,
    pub courses: Vec<CourseHit>,
}

impl ChatContext {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.universities.is_empty() && self.courses.is_empty()
    }
}

impl fmt::Display for ChatContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.universities.is_empty() {
            writeln!(f, "Universities:")?;
            for (i, university) in self.universities.iter().enumerate() {
                writeln!(f, "{}. {} ({})", i + 1, university.name, university.country)?;
                if !university.description.is_empty() {
                    writeln!(f, "   {}", university.description)?;
                }
            }
            writeln!(f)?;
        }

        if !self.courses.is_empty() {
            writeln!(f, "Courses:")?;
            for (i, course) in self.courses.iter().enumerate() {
                writeln!(f, "{}. {} at {}", i + 1, course.name, course.university_name)?;
                writeln!(
                    f,
                    "   Degree: {} | Field: {}",
                    course.degree_type, course.field_of_study
                )?;
                let optional = [
                    ("Starts", &course.starting_date),
                    ("Duration", &course.duration),
                    ("Fees", &course.fee_structure),
                    ("Language", &course.language_of_study),
                ];
                for (label, value) in optional {
                    if let Some(value) = value {
                        writeln!(f, "   {label}: {value}")?;
                    }
                }
                if !course.description.is_empty() {
                    writeln!(f, "   {}", course.description)?;
                }
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    pub intent: QueryIntent,
    pub context: ChatContext,
}

#[derive(Clone)]
pub struct ChatAssistant {
    search: SemanticSearch,
    model: SharedModel,
}

impl ChatAssistant {
    #[inline]
    pub fn new(search: SemanticSearch, model: SharedModel) -> Self {
        Self { search, model }
    }

    /// Answer a user message.
    ///
    /// Never fails: classification, lookup and generation each degrade to a
    /// reduced reply instead.
    #[inline]
    pub async fn respond(&self, query: &str) -> ChatReply {
        let query = query.trim();

        let intent = self.classify(query).await;
        debug!(
            "Intent: lookup={} target={:?} ({})",
            intent.requires_lookup, intent.target, intent.reason
        );

        let context = if intent.requires_lookup {
            self.lookup(query, &intent).await
        } else {
            ChatContext::default()
        };

        let answer = self.answer(query, &context).await;

        ChatReply {
            answer,
            intent,
            context,
        }
    }

    async fn classify(&self, query: &str) -> QueryIntent {
        let prompt = intent_prompt(query);
        let model = Arc::clone(&self.model);
        let reply = run_blocking(move || model.generate(&prompt, ResponseFormat::Json)).await;

        match reply.and_then(|raw| parse_json_reply::<QueryIntent>(&raw)) {
            Ok(intent) => intent,
            Err(e) => {
                warn!("Intent classification failed, answering directly: {:#}", e);
                QueryIntent::fallback(format!("classification failed: {e}"))
            }
        }
    }

    async fn lookup(&self, query: &str, intent: &QueryIntent) -> ChatContext {
        let vector = match self.search.embed_query(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Could not embed chat query, answering without context: {}", e);
                return ChatContext::default();
            }
        };

        let limits = *self.search.config();
        let mut context = ChatContext::default();
        // a lookup without a recognised target searches both kinds
        let target = match intent.target {
            IntentTarget::Unknown => IntentTarget::Both,
            target => target,
        };

        if target.wants_courses() {
            match self
                .search
                .search_courses(&vector, limits.chat_course_limit)
                .await
            {
                Ok(courses) => context.courses = courses,
                Err(e) => warn!("Course lookup failed: {}", e),
            }
        }

        if target.wants_universities() {
            match self
                .search
                .search_universities(&vector, limits.chat_university_limit)
                .await
            {
                Ok(universities) => context.universities = universities,
                Err(e) => warn!("University lookup failed: {}", e),
            }
        }

        debug!(
            "Chat context: {} universities, {} courses",
            context.universities.len(),
            context.courses.len()
        );
        context
    }

    async fn answer(&self, query: &str, context: &ChatContext) -> String {
        let prompt = answer_prompt(query, Some(context));
        let model = Arc::clone(&self.model);

        match run_blocking(move || model.generate(&prompt, ResponseFormat::Text)).await {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                warn!("Answer generation failed: {:#}", e);
                APOLOGY.to_string()
            }
        }
    }
}

#[inline]
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_COMMANDS
        .iter()
        .any(|command| line.eq_ignore_ascii_case(command))
}

/// Interactive chat loop on the terminal. Ends on `exit`, `quit` or EOF.
#[inline]
pub async fn run_repl(assistant: &ChatAssistant) -> Result<()> {
    eprintln!("{}", style("🎓 uni-scout chat").bold().cyan());
    eprintln!("Ask about universities and courses. Type 'exit' or 'quit' to leave.");
    eprintln!();

    loop {
        let line = match Input::<String>::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(e) => {
                debug!("Input closed: {}", e);
                break;
            }
        };

        if is_exit_command(&line) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let reply = assistant.respond(&line).await;
        println!("{} {}", style("Assistant:").bold().green(), reply.answer);
        println!();
    }

    eprintln!("Goodbye!");
    Ok(())
}
