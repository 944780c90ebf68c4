use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Which persistence operations propagate along an association
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum CascadePolicy {
    /// Nothing propagates, the related entity must already be persisted
    #[default]
    None,
    /// Saves propagate (insert new, update existing)
    SaveUpdate,
    /// Saves and deletes propagate
    All,
    /// Like `All`, and children unlinked from a fetched collection are deleted
    AllOrphanRemoval,
}

impl CascadePolicy {
    pub fn cascades_save(self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn cascades_delete(self) -> bool {
        matches!(self, Self::All | Self::AllOrphanRemoval)
    }

    pub fn removes_orphans(self) -> bool {
        matches!(self, Self::AllOrphanRemoval)
    }
}

/// The shape of an association, seen from its source entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// Every directed edge of the entity graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum Association {
    /// Instructor -> InstructorDetail (owning side)
    InstructorDetail,
    /// InstructorDetail -> Instructor (back-reference)
    DetailInstructor,
    /// Instructor -> Courses
    InstructorCourses,
    /// Course -> Instructor
    CourseInstructor,
    /// Course -> Reviews
    CourseReviews,
    /// Review -> Course
    ReviewCourse,
    /// Course -> Students (owning side of the join)
    CourseStudents,
    /// Student -> Courses
    StudentCourses,
}

impl Association {
    pub fn multiplicity(self) -> Multiplicity {
        match self {
            Self::InstructorDetail | Self::DetailInstructor => Multiplicity::OneToOne,
            Self::InstructorCourses | Self::CourseReviews => Multiplicity::OneToMany,
            Self::CourseInstructor | Self::ReviewCourse => Multiplicity::ManyToOne,
            Self::CourseStudents | Self::StudentCourses => Multiplicity::ManyToMany,
        }
    }

    /// Whether the target rows belong exclusively to the source
    fn owns_target(self) -> bool {
        matches!(
            self,
            Self::InstructorDetail | Self::InstructorCourses | Self::CourseReviews
        )
    }

    /// The policy used when nothing overrides it
    pub fn default_policy(self) -> CascadePolicy {
        match self {
            Self::InstructorDetail => CascadePolicy::All,
            Self::DetailInstructor => CascadePolicy::SaveUpdate,
            Self::InstructorCourses => CascadePolicy::SaveUpdate,
            Self::CourseInstructor => CascadePolicy::None,
            Self::CourseReviews => CascadePolicy::AllOrphanRemoval,
            Self::ReviewCourse => CascadePolicy::None,
            Self::CourseStudents => CascadePolicy::SaveUpdate,
            Self::StudentCourses => CascadePolicy::None,
        }
    }

    /// Name of the environment variable that overrides this association's policy
    pub fn env_key(self) -> String {
        let mut key = String::from("CASCADE");
        for c in self.to_string().chars() {
            if c.is_uppercase() {
                key.push('_');
            }
            key.push(c.to_ascii_uppercase());
        }
        key
    }
}

/// Cascade policy for each association, fixed when the session factory is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mappings {
    policies: HashMap<Association, CascadePolicy>,
}

impl Default for Mappings {
    fn default() -> Self {
        Self {
            policies: Association::iter()
                .map(|association| (association, association.default_policy()))
                .collect(),
        }
    }
}

impl Mappings {
    pub fn policy(&self, association: Association) -> CascadePolicy {
        self.policies
            .get(&association)
            .copied()
            .unwrap_or_else(|| association.default_policy())
    }

    /// Overrides one association's policy, rejecting combinations that would
    /// delete rows shared with other entities
    pub fn with(mut self, association: Association, policy: CascadePolicy) -> Result<Self, GraphError> {
        if policy.removes_orphans() && !association.owns_target() {
            return Err(GraphError::InvalidMapping {
                association,
                policy,
                reason: "orphan removal needs an owned one-to-one or one-to-many target",
            });
        }

        if policy.cascades_delete()
            && matches!(
                association.multiplicity(),
                Multiplicity::ManyToMany | Multiplicity::ManyToOne
            )
        {
            return Err(GraphError::InvalidMapping {
                association,
                policy,
                reason: "the target rows are shared with other entities",
            });
        }

        self.policies.insert(association, policy);
        Ok(self)
    }

    /// Applies overrides such as `CASCADE_DETAIL_INSTRUCTOR=All`, looked up
    /// through `lookup` so callers decide where values come from
    pub fn with_overrides<F>(self, lookup: F) -> Result<Self, GraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut mappings = self;
        for association in Association::iter() {
            let key = association.env_key();
            if let Some(raw) = lookup(&key) {
                let policy = raw.trim().parse::<CascadePolicy>().map_err(|_| {
                    GraphError::UnknownPolicy {
                        key: key.clone(),
                        value: raw.clone(),
                    }
                })?;
                mappings = mappings.with(association, policy)?;
            }
        }
        Ok(mappings)
    }
}
