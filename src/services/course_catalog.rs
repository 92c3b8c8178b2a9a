use std::collections::HashMap;

use crate::{
    errors::AppResult,
    models::domain::{Course, CourseModule, QuizDefinition},
};
use crate::repositories::CatalogRepository;

/// Immutable snapshot of courses, modules and quiz definitions, loaded once
/// at process start. The conversational flow only ever reads from it.
pub struct CourseCatalog {
    courses: Vec<Course>,
    quizzes: HashMap<String, QuizDefinition>,
}

impl CourseCatalog {
    pub async fn load(repository: &dyn CatalogRepository) -> AppResult<Self> {
        let mut courses = repository.load_courses().await?;
        for course in &mut courses {
            course.modules.sort_by_key(|m| m.sequence_order);
        }

        let quizzes: HashMap<String, QuizDefinition> = repository
            .load_quizzes()
            .await?
            .into_iter()
            .map(|quiz| (quiz.id.clone(), quiz))
            .collect();

        log::info!(
            "✅ Loaded {} courses and {} quizzes from database",
            courses.len(),
            quizzes.len()
        );
        for course in &courses {
            log::info!("   - {}: {} modules", course.name, course.modules.len());
        }

        Ok(Self { courses, quizzes })
    }

    /// Build a catalog directly from data, bypassing the repository. Used by
    /// tests and tooling.
    pub fn from_parts(courses: Vec<Course>, quizzes: Vec<QuizDefinition>) -> Self {
        Self {
            courses,
            quizzes: quizzes
                .into_iter()
                .map(|quiz| (quiz.id.clone(), quiz))
                .collect(),
        }
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    /// Course by its 1-based menu position.
    pub fn course_by_position(&self, position: usize) -> Option<&Course> {
        position.checked_sub(1).and_then(|i| self.courses.get(i))
    }

    pub fn course_by_id(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    pub fn find_module(&self, module_id: &str) -> Option<(&Course, &CourseModule)> {
        self.courses.iter().find_map(|course| {
            course
                .modules
                .iter()
                .find(|m| m.id == module_id)
                .map(|module| (course, module))
        })
    }

    pub fn quiz(&self, quiz_id: &str) -> Option<&QuizDefinition> {
        self.quizzes.get(quiz_id)
    }
}
