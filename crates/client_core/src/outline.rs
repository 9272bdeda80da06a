//! Editable outline state used while reviewing a generated structure.

use shared::domain::{JobId, OutlineTopic};

use crate::error::WorkflowError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineReview {
    job_id: JobId,
    topics: Vec<OutlineTopic>,
}

fn out_of_range(what: &str, index: usize) -> WorkflowError {
    WorkflowError::Validation(format!("no {what} at position {}", index + 1))
}

impl OutlineReview {
    pub fn new(job_id: JobId, topics: Vec<OutlineTopic>) -> Self {
        Self { job_id, topics }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn topics(&self) -> &[OutlineTopic] {
        &self.topics
    }

    pub fn into_parts(self) -> (JobId, Vec<OutlineTopic>) {
        (self.job_id, self.topics)
    }

    fn topic_mut(&mut self, topic: usize) -> Result<&mut OutlineTopic, WorkflowError> {
        self.topics
            .get_mut(topic)
            .ok_or_else(|| out_of_range("topic", topic))
    }

    pub fn rename_topic(&mut self, topic: usize, title: &str) -> Result<(), WorkflowError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(WorkflowError::Validation("Topic title is required".into()));
        }
        self.topic_mut(topic)?.title = title.to_string();
        Ok(())
    }

    pub fn edit_subtopic(
        &mut self,
        topic: usize,
        subtopic: usize,
        text: &str,
    ) -> Result<(), WorkflowError> {
        let entry = self
            .topic_mut(topic)?
            .subtopics
            .get_mut(subtopic)
            .ok_or_else(|| out_of_range("subtopic", subtopic))?;
        *entry = text.trim().to_string();
        Ok(())
    }

    pub fn add_subtopic(&mut self, topic: usize, text: &str) -> Result<(), WorkflowError> {
        self.topic_mut(topic)?.subtopics.push(text.trim().to_string());
        Ok(())
    }

    pub fn remove_subtopic(&mut self, topic: usize, subtopic: usize) -> Result<String, WorkflowError> {
        let subtopics = &mut self.topic_mut(topic)?.subtopics;
        if subtopic >= subtopics.len() {
            return Err(out_of_range("subtopic", subtopic));
        }
        Ok(subtopics.remove(subtopic))
    }

    pub fn delete_topic(&mut self, topic: usize) -> Result<OutlineTopic, WorkflowError> {
        if topic >= self.topics.len() {
            return Err(out_of_range("topic", topic));
        }
        Ok(self.topics.remove(topic))
    }

    /// Moves a topic to `to`, shifting the topics in between.
    pub fn move_topic(&mut self, from: usize, to: usize) -> Result<(), WorkflowError> {
        if from >= self.topics.len() {
            return Err(out_of_range("topic", from));
        }
        if to >= self.topics.len() {
            return Err(out_of_range("topic", to));
        }
        let topic = self.topics.remove(from);
        self.topics.insert(to, topic);
        Ok(())
    }

    /// Checks the outline is buildable. Blank subtopics are dropped.
    pub fn finalize(mut self) -> Result<(JobId, Vec<OutlineTopic>), WorkflowError> {
        if self.topics.is_empty() {
            return Err(WorkflowError::Validation(
                "The outline needs at least one topic".into(),
            ));
        }
        for topic in &mut self.topics {
            if topic.title.trim().is_empty() {
                return Err(WorkflowError::Validation("Topic title is required".into()));
            }
            topic.subtopics.retain(|subtopic| !subtopic.trim().is_empty());
        }
        Ok(self.into_parts())
    }
}
