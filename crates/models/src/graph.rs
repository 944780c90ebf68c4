use crate::{
    cascade::Association,
    entity::{Collection, Course, Instructor, InstructorDetail, Review, Student},
    error::GraphError,
};
use std::{
    collections::HashMap,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::{Index, IndexMut},
};
use uuid::Uuid;

pub(crate) mod private {
    use uuid::Uuid;

    pub trait IdSlot {
        fn id_slot(&mut self) -> &mut Option<Uuid>;
    }
}

/// Typed handle to a node of an [`EntityGraph`]. Only meaningful for the
/// graph that created it.
pub struct Key<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub(crate) fn from_index(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Key<T> {}

impl<T> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Debug for Key<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Key({})", self.index)
    }
}

/// Nodes of one entity type plus an index from stored id to node
#[derive(Debug, Clone)]
pub struct Arena<T> {
    nodes: Vec<T>,
    by_id: HashMap<Uuid, usize>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            by_id: HashMap::new(),
        }
    }
}

impl<T: GraphNode> Arena<T> {
    fn insert(&mut self, node: T) -> Key<T> {
        let index = self.nodes.len();
        if let Some(id) = node.id() {
            self.by_id.insert(id, index);
        }
        self.nodes.push(node);
        Key::from_index(index)
    }

    fn find(&self, id: Uuid) -> Option<Key<T>> {
        self.by_id.get(&id).copied().map(Key::from_index)
    }

    fn set_id(&mut self, key: Key<T>, id: Option<Uuid>) {
        let slot = self.nodes[key.index].id_slot();
        if let Some(old) = slot.take() {
            self.by_id.remove(&old);
        }
        *slot = id;
        if let Some(id) = id {
            self.by_id.insert(id, key.index);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = Key<T>> + use<T> {
        (0..self.nodes.len()).map(Key::from_index)
    }
}

/// An entity type that can live in the graph
pub trait GraphNode: private::IdSlot + Sized {
    const NAME: &'static str;

    /// Stored identifier, `None` until the node is first saved
    fn id(&self) -> Option<Uuid>;

    fn arena(graph: &EntityGraph) -> &Arena<Self>;

    fn arena_mut(graph: &mut EntityGraph) -> &mut Arena<Self>;

    fn node_ref(key: Key<Self>) -> NodeRef;

    fn key_of(node: NodeRef) -> Option<Key<Self>>;
}

/// A key of any node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Instructor(Key<Instructor>),
    InstructorDetail(Key<InstructorDetail>),
    Course(Key<Course>),
    Review(Key<Review>),
    Student(Key<Student>),
}

impl NodeRef {
    pub fn entity_name(self) -> &'static str {
        match self {
            Self::Instructor(_) => Instructor::NAME,
            Self::InstructorDetail(_) => InstructorDetail::NAME,
            Self::Course(_) => Course::NAME,
            Self::Review(_) => Review::NAME,
            Self::Student(_) => Student::NAME,
        }
    }
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let index = match self {
            Self::Instructor(key) => key.index,
            Self::InstructorDetail(key) => key.index,
            Self::Course(key) => key.index,
            Self::Review(key) => key.index,
            Self::Student(key) => key.index,
        };
        write!(f, "{}#{}", self.entity_name(), index)
    }
}

impl<T: GraphNode> From<Key<T>> for NodeRef {
    fn from(key: Key<T>) -> Self {
        T::node_ref(key)
    }
}

/// Caller-owned object graph. Parents and children point at each other
/// through keys, and the link helpers below keep both sides in step.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    pub(crate) instructors: Arena<Instructor>,
    pub(crate) details: Arena<InstructorDetail>,
    pub(crate) courses: Arena<Course>,
    pub(crate) reviews: Arena<Review>,
    pub(crate) students: Arena<Student>,
}

impl<T: GraphNode> Index<Key<T>> for EntityGraph {
    type Output = T;

    fn index(&self, key: Key<T>) -> &T {
        &T::arena(self).nodes[key.index]
    }
}

impl<T: GraphNode> IndexMut<Key<T>> for EntityGraph {
    fn index_mut(&mut self, key: Key<T>) -> &mut T {
        &mut T::arena_mut(self).nodes[key.index]
    }
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: GraphNode>(&mut self, node: T) -> Key<T> {
        T::arena_mut(self).insert(node)
    }

    /// Finds the node holding a stored id
    pub fn find<T: GraphNode>(&self, id: Uuid) -> Option<Key<T>> {
        T::arena(self).find(id)
    }

    pub fn id_of<T: GraphNode>(&self, key: Key<T>) -> Option<Uuid> {
        self[key].id()
    }

    /// Sets or clears a node's stored id. Used by the persistence layer when
    /// it generates ids and when it evicts deleted rows.
    pub fn assign_id<T: GraphNode>(&mut self, key: Key<T>, id: Option<Uuid>) {
        T::arena_mut(self).set_id(key, id);
    }

    pub fn keys<T: GraphNode>(&self) -> impl Iterator<Item = Key<T>> + use<T> {
        T::arena(self).keys()
    }

    pub fn node_id(&self, node: NodeRef) -> Option<Uuid> {
        match node {
            NodeRef::Instructor(key) => self.id_of(key),
            NodeRef::InstructorDetail(key) => self.id_of(key),
            NodeRef::Course(key) => self.id_of(key),
            NodeRef::Review(key) => self.id_of(key),
            NodeRef::Student(key) => self.id_of(key),
        }
    }

    /// Links an instructor and a detail on both sides, unlinking whatever
    /// either was attached to before
    pub fn set_detail(&mut self, instructor: Key<Instructor>, detail: Key<InstructorDetail>) {
        if let Some(old) = self[instructor].detail
            && old != detail
        {
            self[old].instructor = None;
        }
        if let Some(previous) = self[detail].instructor
            && previous != instructor
        {
            self[previous].detail = None;
        }

        self[instructor].detail = Some(detail);
        self[detail].instructor = Some(instructor);
    }

    pub fn clear_detail(&mut self, instructor: Key<Instructor>) -> Option<Key<InstructorDetail>> {
        let detail = self[instructor].detail.take()?;
        self[detail].instructor = None;
        Some(detail)
    }

    pub fn add_course(&mut self, instructor: Key<Instructor>, course: Key<Course>) {
        if let Some(previous) = self[course].instructor
            && previous != instructor
        {
            self[previous].courses.remove(course);
        }

        self[course].instructor = Some(instructor);
        self[instructor].courses.add(course);
    }

    pub fn remove_course(
        &mut self,
        instructor: Key<Instructor>,
        course: Key<Course>,
    ) -> Result<bool, GraphError> {
        self[instructor]
            .courses
            .fetched(Association::InstructorCourses)?;

        let removed = self[instructor].courses.remove(course);
        if self[course].instructor == Some(instructor) {
            self[course].instructor = None;
        }
        Ok(removed)
    }

    pub fn add_review(&mut self, course: Key<Course>, review: Key<Review>) {
        if let Some(previous) = self[review].course
            && previous != course
        {
            self[previous].reviews.remove(review);
        }

        self[review].course = Some(course);
        self[course].reviews.add(review);
    }

    /// Unlinks a review. Saving the course afterwards deletes the review row
    /// when the association removes orphans.
    pub fn remove_review(
        &mut self,
        course: Key<Course>,
        review: Key<Review>,
    ) -> Result<bool, GraphError> {
        self[course].reviews.fetched(Association::CourseReviews)?;

        let removed = self[course].reviews.remove(review);
        if self[review].course == Some(course) {
            self[review].course = None;
        }
        Ok(removed)
    }

    pub fn add_student(&mut self, course: Key<Course>, student: Key<Student>) {
        self[course].students.add(student);
        self[student].courses.add(course);
    }

    pub fn remove_student(
        &mut self,
        course: Key<Course>,
        student: Key<Student>,
    ) -> Result<bool, GraphError> {
        self[course].students.fetched(Association::CourseStudents)?;

        let removed = self[course].students.remove(student);
        self[student].courses.remove(course);
        Ok(removed)
    }

    /// Verifies that every link leaving `node` is mirrored on the other side.
    /// Unfetched collections only vouch for their queued additions, so a
    /// missing mirror there is not an error.
    pub fn check_links(&self, node: NodeRef) -> Result<(), GraphError> {
        match node {
            NodeRef::Instructor(instructor) => {
                if let Some(detail) = self[instructor].detail
                    && self[detail].instructor != Some(instructor)
                {
                    return Err(inconsistent(
                        Association::InstructorDetail,
                        node,
                        detail.into(),
                    ));
                }
                for &course in self[instructor].courses.queued_or_fetched() {
                    if self[course].instructor != Some(instructor) {
                        return Err(inconsistent(
                            Association::InstructorCourses,
                            node,
                            course.into(),
                        ));
                    }
                }
            }
            NodeRef::InstructorDetail(detail) => {
                if let Some(instructor) = self[detail].instructor
                    && self[instructor].detail != Some(detail)
                {
                    return Err(inconsistent(
                        Association::DetailInstructor,
                        node,
                        instructor.into(),
                    ));
                }
            }
            NodeRef::Course(course) => {
                if let Some(instructor) = self[course].instructor
                    && !mirrored(&self[instructor].courses, course)
                {
                    return Err(inconsistent(
                        Association::CourseInstructor,
                        node,
                        instructor.into(),
                    ));
                }
                for &review in self[course].reviews.queued_or_fetched() {
                    if self[review].course != Some(course) {
                        return Err(inconsistent(
                            Association::CourseReviews,
                            node,
                            review.into(),
                        ));
                    }
                }
                for &student in self[course].students.queued_or_fetched() {
                    if !mirrored(&self[student].courses, course) {
                        return Err(inconsistent(
                            Association::CourseStudents,
                            node,
                            student.into(),
                        ));
                    }
                }
            }
            NodeRef::Review(review) => {
                if let Some(course) = self[review].course
                    && !mirrored(&self[course].reviews, review)
                {
                    return Err(inconsistent(
                        Association::ReviewCourse,
                        node,
                        course.into(),
                    ));
                }
            }
            NodeRef::Student(student) => {
                for &course in self[student].courses.queued_or_fetched() {
                    if !mirrored(&self[course].students, student) {
                        return Err(inconsistent(
                            Association::StudentCourses,
                            node,
                            course.into(),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Forgets a node's stored id and removes every link to it, used after
    /// its row has been deleted
    pub fn evict(&mut self, node: NodeRef) {
        match node {
            NodeRef::Instructor(instructor) => {
                self.assign_id(instructor, None);
                self.clear_detail(instructor);
                for course in self.keys::<Course>() {
                    if self[course].instructor == Some(instructor) {
                        self[course].instructor = None;
                    }
                }
                self[instructor].courses = Collection::default();
            }
            NodeRef::InstructorDetail(detail) => {
                self.assign_id(detail, None);
                for instructor in self.keys::<Instructor>() {
                    if self[instructor].detail == Some(detail) {
                        self[instructor].detail = None;
                    }
                }
                self[detail].instructor = None;
            }
            NodeRef::Course(course) => {
                self.assign_id(course, None);
                for instructor in self.keys::<Instructor>() {
                    self[instructor].courses.remove(course);
                }
                for review in self.keys::<Review>() {
                    if self[review].course == Some(course) {
                        self[review].course = None;
                    }
                }
                for student in self.keys::<Student>() {
                    self[student].courses.remove(course);
                }
                let node = &mut self[course];
                node.instructor = None;
                node.reviews = Collection::default();
                node.students = Collection::default();
            }
            NodeRef::Review(review) => {
                self.assign_id(review, None);
                for course in self.keys::<Course>() {
                    self[course].reviews.remove(review);
                }
                self[review].course = None;
            }
            NodeRef::Student(student) => {
                self.assign_id(student, None);
                for course in self.keys::<Course>() {
                    self[course].students.remove(student);
                }
                self[student].courses = Collection::default();
            }
        }
    }
}

fn mirrored<T>(collection: &Collection<T>, key: Key<T>) -> bool {
    !collection.is_fetched() || collection.contains(key)
}

fn inconsistent(association: Association, from: NodeRef, to: NodeRef) -> GraphError {
    GraphError::Inconsistent {
        association,
        detail: format!("{from} points at {to} but {to} does not point back"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::SessionToken;

    #[test]
    fn test_set_detail_links_both_sides() {
        let mut graph = EntityGraph::new();
        let instructor = graph.insert(Instructor::new("Padmanabha", "Das", "pd@example.com"));
        let detail = graph.insert(InstructorDetail::new(
            "https://studio.youtube.com",
            "Learning & Development",
        ));

        graph.set_detail(instructor, detail);
        assert_eq!(graph[instructor].detail, Some(detail));
        assert_eq!(graph[detail].instructor, Some(instructor));
        assert!(graph.check_links(instructor.into()).is_ok());
        assert!(graph.check_links(detail.into()).is_ok());

        // Moving the detail unlinks the old instructor
        let other = graph.insert(Instructor::new("Susan", "Public", "susan@example.com"));
        graph.set_detail(other, detail);
        assert_eq!(graph[instructor].detail, None);
        assert_eq!(graph[detail].instructor, Some(other));
    }

    #[test]
    fn test_one_sided_link_is_inconsistent() {
        let mut graph = EntityGraph::new();
        let course = graph.insert(Course::new("Atari 2600 - Game Development"));
        let review = graph.insert(Review::new("Great Course... loved it"));

        // Only the collection side
        graph[course].reviews.add(review);
        let result = graph.check_links(course.into());
        assert!(matches!(
            result,
            Err(GraphError::Inconsistent {
                association: Association::CourseReviews,
                ..
            })
        ));

        graph[review].course = Some(course);
        assert!(graph.check_links(course.into()).is_ok());
        assert!(graph.check_links(review.into()).is_ok());
    }

    #[test]
    fn test_add_review_moves_between_courses() {
        let mut graph = EntityGraph::new();
        let first = graph.insert(Course::new("First"));
        let second = graph.insert(Course::new("Second"));
        let review = graph.insert(Review::new("Cool course, good job well done"));

        graph.add_review(first, review);
        graph.add_review(second, review);

        assert!(!graph[first].reviews.contains(review));
        assert!(graph[second].reviews.contains(review));
        assert_eq!(graph[review].course, Some(second));
    }

    #[test]
    fn test_remove_review_requires_fetched_collection() {
        let token = SessionToken::new(1);
        let mut graph = EntityGraph::new();
        let course = graph.insert(Course::new("Pacman"));
        let review = graph.insert(Review::new("What a dumb course"));
        graph[course].reviews = Collection::pending(token.bind());

        assert_eq!(
            graph.remove_review(course, review),
            Err(GraphError::NotFetched {
                association: Association::CourseReviews
            })
        );

        graph[course].reviews.resolve(vec![]);
        graph.add_review(course, review);
        assert_eq!(graph.remove_review(course, review), Ok(true));
        assert_eq!(graph[review].course, None);
    }

    #[test]
    fn test_add_student_to_unfetched_side() {
        let token = SessionToken::new(1);
        let mut graph = EntityGraph::new();
        let course = graph.insert(Course::new("Rubik's Cube - How to Speed Cube"));
        let student = graph.insert(Student::new("Mary", "Public", "mary@example.com"));
        graph[student].courses = Collection::pending(token.bind());

        graph.add_student(course, student);
        assert!(graph[course].students.contains(student));
        assert_eq!(graph[student].courses.queued_or_fetched(), &[course]);
        assert!(graph.check_links(course.into()).is_ok());
        assert!(graph.check_links(student.into()).is_ok());
    }

    #[test]
    fn test_assign_id_updates_index() {
        let mut graph = EntityGraph::new();
        let student = graph.insert(Student::new("Daffy", "Duck", "daffy@example.com"));
        let id = Uuid::new_v4();

        graph.assign_id(student, Some(id));
        assert_eq!(graph.find::<Student>(id), Some(student));
        assert_eq!(graph.id_of(student), Some(id));

        graph.assign_id(student, None);
        assert_eq!(graph.find::<Student>(id), None);
    }

    #[test]
    fn test_evict_course_unlinks_everything() {
        let mut graph = EntityGraph::new();
        let instructor = graph.insert(Instructor::new("Padmanabha", "Das", "pd@example.com"));
        let course = graph.insert(Course::new("Pacman"));
        let review = graph.insert(Review::new("Great Course... loved it"));
        let student = graph.insert(Student::new("John", "Doe", "john@example.com"));
        graph.assign_id(course, Some(Uuid::new_v4()));

        graph.add_course(instructor, course);
        graph.add_review(course, review);
        graph.add_student(course, student);

        graph.evict(course.into());

        assert_eq!(graph.id_of(course), None);
        assert!(!graph[instructor].courses.contains(course));
        assert_eq!(graph[review].course, None);
        assert!(!graph[student].courses.contains(course));
        assert!(graph[course].reviews.queued_or_fetched().is_empty());
    }
}
