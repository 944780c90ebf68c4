use crate::{
    binding::SessionBinding,
    cascade::Association,
    error::GraphError,
    graph::{EntityGraph, GraphNode, Key, NodeRef, private::IdSlot},
};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

/// A to-many side of an association
#[derive(Debug, Clone)]
pub enum Collection<T> {
    /// Contents are known in memory
    Fetched(Vec<Key<T>>),
    /// Contents live in the store and are fetched on demand through the
    /// session the owner was loaded in. Additions made before the fetch are
    /// queued and merged in afterwards.
    Pending {
        binding: SessionBinding,
        queued: Vec<Key<T>>,
    },
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::Fetched(Vec::new())
    }
}

impl<T> Collection<T> {
    pub fn pending(binding: SessionBinding) -> Self {
        Self::Pending {
            binding,
            queued: Vec::new(),
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }

    pub fn binding(&self) -> Option<&SessionBinding> {
        match self {
            Self::Fetched(_) => None,
            Self::Pending { binding, .. } => Some(binding),
        }
    }

    /// The fetched contents, or why they are unavailable
    pub fn fetched(&self, association: Association) -> Result<&[Key<T>], GraphError> {
        match self {
            Self::Fetched(keys) => Ok(keys),
            Self::Pending { binding, .. } if binding.is_open() => {
                Err(GraphError::NotFetched { association })
            }
            Self::Pending { .. } => Err(GraphError::Detached { association }),
        }
    }

    /// Every member held in memory: all of them once fetched, otherwise only
    /// the queued additions. Does not check the session, so it is no
    /// substitute for `fetched` when the whole collection is wanted.
    pub fn queued_or_fetched(&self) -> &[Key<T>] {
        match self {
            Self::Fetched(keys) => keys,
            Self::Pending { queued, .. } => queued,
        }
    }

    pub(crate) fn contains(&self, key: Key<T>) -> bool {
        self.queued_or_fetched().contains(&key)
    }

    pub fn add(&mut self, key: Key<T>) {
        let keys = match self {
            Self::Fetched(keys) => keys,
            Self::Pending { queued, .. } => queued,
        };
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    pub fn remove(&mut self, key: Key<T>) -> bool {
        let keys = match self {
            Self::Fetched(keys) => keys,
            Self::Pending { queued, .. } => queued,
        };
        let before = keys.len();
        keys.retain(|k| *k != key);
        keys.len() != before
    }

    /// Records a member read from the store. Unfetched collections ignore it,
    /// their fetch will bring it along.
    pub fn note_loaded(&mut self, key: Key<T>) {
        if let Self::Fetched(keys) = self
            && !keys.contains(&key)
        {
            keys.push(key);
        }
    }

    /// Marks the collection fetched with `loaded`, keeping queued additions
    pub fn resolve(&mut self, loaded: Vec<Key<T>>) {
        let mut keys = loaded;
        if let Self::Pending { queued, .. } = self {
            for key in queued.drain(..) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        *self = Self::Fetched(keys);
    }

    /// Moves an unfetched collection over to another session
    pub fn rebind(&mut self, binding: SessionBinding) {
        if let Self::Pending { binding: current, .. } = self {
            *current = binding;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instructor {
    pub(crate) id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub detail: Option<Key<InstructorDetail>>,
    pub courses: Collection<Course>,
}

impl Instructor {
    pub fn new(first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            id: None,
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
            email: email.to_owned(),
            detail: None,
            courses: Collection::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstructorDetail {
    pub(crate) id: Option<Uuid>,
    pub youtube_channel: String,
    pub hobby: String,
    pub instructor: Option<Key<Instructor>>,
}

impl InstructorDetail {
    pub fn new(youtube_channel: &str, hobby: &str) -> Self {
        Self {
            id: None,
            youtube_channel: youtube_channel.to_owned(),
            hobby: hobby.to_owned(),
            instructor: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Course {
    pub(crate) id: Option<Uuid>,
    pub title: String,
    pub instructor: Option<Key<Instructor>>,
    pub reviews: Collection<Review>,
    pub students: Collection<Student>,
}

impl Course {
    pub fn new(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_owned(),
            instructor: None,
            reviews: Collection::default(),
            students: Collection::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Review {
    pub(crate) id: Option<Uuid>,
    pub comment: String,
    pub course: Option<Key<Course>>,
}

impl Review {
    pub fn new(comment: &str) -> Self {
        Self {
            id: None,
            comment: comment.to_owned(),
            course: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub(crate) id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub courses: Collection<Course>,
}

impl Student {
    pub fn new(first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            id: None,
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
            email: email.to_owned(),
            courses: Collection::default(),
        }
    }
}

macro_rules! graph_node {
    ($node:ident, $field:ident, $variant:ident, $name:literal) => {
        impl IdSlot for $node {
            fn id_slot(&mut self) -> &mut Option<Uuid> {
                &mut self.id
            }
        }

        impl GraphNode for $node {
            const NAME: &'static str = $name;

            fn id(&self) -> Option<Uuid> {
                self.id
            }

            fn arena(graph: &EntityGraph) -> &crate::graph::Arena<Self> {
                &graph.$field
            }

            fn arena_mut(graph: &mut EntityGraph) -> &mut crate::graph::Arena<Self> {
                &mut graph.$field
            }

            fn node_ref(key: Key<Self>) -> NodeRef {
                NodeRef::$variant(key)
            }

            fn key_of(node: NodeRef) -> Option<Key<Self>> {
                match node {
                    NodeRef::$variant(key) => Some(key),
                    _ => None,
                }
            }
        }
    };
}

graph_node!(Instructor, instructors, Instructor, "Instructor");
graph_node!(InstructorDetail, details, InstructorDetail, "InstructorDetail");
graph_node!(Course, courses, Course, "Course");
graph_node!(Review, reviews, Review, "Review");
graph_node!(Student, students, Student, "Student");

/// Formats an optional id the way the demos print it
struct ShowId(Option<Uuid>);

impl Display for ShowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.0 {
            Some(id) => write!(f, "{id}"),
            None => write!(f, "unsaved"),
        }
    }
}

impl Display for Instructor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Instructor [id={}, first_name={}, last_name={}, email={}]",
            ShowId(self.id),
            self.first_name,
            self.last_name,
            self.email
        )
    }
}

impl Display for InstructorDetail {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "InstructorDetail [id={}, youtube_channel={}, hobby={}]",
            ShowId(self.id),
            self.youtube_channel,
            self.hobby
        )
    }
}

impl Display for Course {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Course [id={}, title={}]", ShowId(self.id), self.title)
    }
}

impl Display for Review {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Review [id={}, comment={}]", ShowId(self.id), self.comment)
    }
}

impl Display for Student {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Student [id={}, first_name={}, last_name={}, email={}]",
            ShowId(self.id),
            self.first_name,
            self.last_name,
            self.email
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::SessionToken;

    fn key<T>(index: usize) -> Key<T> {
        Key::from_index(index)
    }

    #[test]
    fn test_collection_pending_access() {
        let token = SessionToken::new(1);
        let collection: Collection<Review> = Collection::pending(token.bind());
        assert_eq!(
            collection.fetched(Association::CourseReviews),
            Err(GraphError::NotFetched {
                association: Association::CourseReviews
            })
        );

        drop(token);
        assert_eq!(
            collection.fetched(Association::CourseReviews),
            Err(GraphError::Detached {
                association: Association::CourseReviews
            })
        );
    }

    #[test]
    fn test_closed_collection_does_not_pass_for_empty() {
        let token = SessionToken::new(1);
        let mut collection: Collection<Course> = Collection::pending(token.bind());
        collection.add(key(2));
        drop(token);

        // Only the queued addition is held, the stored members are out of reach
        assert_eq!(collection.queued_or_fetched(), &[key(2)]);
        assert!(!collection.is_fetched());
        assert_eq!(
            collection.fetched(Association::StudentCourses),
            Err(GraphError::Detached {
                association: Association::StudentCourses
            })
        );
    }

    #[test]
    fn test_collection_resolve_keeps_queued() {
        let token = SessionToken::new(1);
        let mut collection: Collection<Student> = Collection::pending(token.bind());
        collection.add(key(3));
        collection.add(key(3));
        assert_eq!(collection.queued_or_fetched().len(), 1);

        collection.resolve(vec![key(1), key(3)]);
        assert!(collection.is_fetched());
        assert_eq!(collection.queued_or_fetched(), &[key(1), key(3)]);
    }

    #[test]
    fn test_display() {
        let course = Course::new("Pacman - How to score one million points");
        assert_eq!(
            course.to_string(),
            "Course [id=unsaved, title=Pacman - How to score one million points]"
        );
    }
}
