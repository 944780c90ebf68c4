use super::Session;
use crate::{
    entities::{course, course_student, instructor, instructor_detail, review, student},
    error::PersistenceError,
};
use futures::future::BoxFuture;
use log::debug;
use models::{
    Association, Collection, Course, EntityGraph, GraphNode, Instructor, InstructorDetail, Key,
    NodeRef, Review, SessionBinding, Student,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

/// An entity that can be read into a graph by id
pub trait Loadable: GraphNode {
    fn load<'a>(
        session: &'a Session,
        graph: &'a mut EntityGraph,
        id: Uuid,
    ) -> BoxFuture<'a, Result<Key<Self>, PersistenceError>>;
}

impl Loadable for Instructor {
    fn load<'a>(
        session: &'a Session,
        graph: &'a mut EntityGraph,
        id: Uuid,
    ) -> BoxFuture<'a, Result<Key<Self>, PersistenceError>> {
        Box::pin(session.load_instructor(graph, id))
    }
}

impl Loadable for InstructorDetail {
    fn load<'a>(
        session: &'a Session,
        graph: &'a mut EntityGraph,
        id: Uuid,
    ) -> BoxFuture<'a, Result<Key<Self>, PersistenceError>> {
        Box::pin(session.load_detail(graph, id))
    }
}

impl Loadable for Course {
    fn load<'a>(
        session: &'a Session,
        graph: &'a mut EntityGraph,
        id: Uuid,
    ) -> BoxFuture<'a, Result<Key<Self>, PersistenceError>> {
        Box::pin(session.load_course(graph, id))
    }
}

impl Loadable for Review {
    fn load<'a>(
        session: &'a Session,
        graph: &'a mut EntityGraph,
        id: Uuid,
    ) -> BoxFuture<'a, Result<Key<Self>, PersistenceError>> {
        Box::pin(session.load_review(graph, id))
    }
}

impl Loadable for Student {
    fn load<'a>(
        session: &'a Session,
        graph: &'a mut EntityGraph,
        id: Uuid,
    ) -> BoxFuture<'a, Result<Key<Self>, PersistenceError>> {
        Box::pin(session.load_student(graph, id))
    }
}

impl Session {
    /// Reads an entity into `graph`. To-one links are loaded eagerly, to-many
    /// links stay unfetched until one of the `fetch_*` calls below is made
    /// through this session. A node already in the graph is returned as is.
    pub async fn load<T: Loadable>(
        &self,
        graph: &mut EntityGraph,
        id: Uuid,
    ) -> Result<Key<T>, PersistenceError> {
        debug!("Session {}: loading {} {id}", self.id(), T::NAME);
        T::load(self, graph, id).await
    }

    async fn load_instructor(
        &self,
        graph: &mut EntityGraph,
        id: Uuid,
    ) -> Result<Key<Instructor>, PersistenceError> {
        if let Some(key) = graph.find::<Instructor>(id) {
            graph[key].courses.rebind(self.token.bind());
            return Ok(key);
        }

        let model = instructor::Entity::find_by_id(id)
            .one(&self.txn)
            .await?
            .ok_or(PersistenceError::NotFound {
                entity: Instructor::NAME,
                id,
            })?;
        self.attach_instructor(graph, model).await
    }

    async fn attach_instructor(
        &self,
        graph: &mut EntityGraph,
        model: instructor::Model,
    ) -> Result<Key<Instructor>, PersistenceError> {
        if let Some(key) = graph.find::<Instructor>(model.id) {
            graph[key].courses.rebind(self.token.bind());
            return Ok(key);
        }

        let detail = match model.instructor_detail_id {
            Some(detail_id) => {
                instructor_detail::Entity::find_by_id(detail_id)
                    .one(&self.txn)
                    .await?
            }
            None => None,
        };

        let mut node = Instructor::new(&model.first_name, &model.last_name, &model.email);
        node.courses = Collection::pending(self.token.bind());
        let key = graph.insert(node);
        graph.assign_id(key, Some(model.id));

        if let Some(detail) = detail {
            let detail = detail_node(graph, detail);
            if graph[detail].instructor.is_none() {
                graph.set_detail(key, detail);
            }
        }
        Ok(key)
    }

    async fn load_detail(
        &self,
        graph: &mut EntityGraph,
        id: Uuid,
    ) -> Result<Key<InstructorDetail>, PersistenceError> {
        if let Some(key) = graph.find::<InstructorDetail>(id) {
            return Ok(key);
        }

        let model = instructor_detail::Entity::find_by_id(id)
            .one(&self.txn)
            .await?
            .ok_or(PersistenceError::NotFound {
                entity: InstructorDetail::NAME,
                id,
            })?;

        // The back-reference is eager too, which brings the detail along
        let owner = instructor::Entity::find()
            .filter(instructor::Column::InstructorDetailId.eq(id))
            .one(&self.txn)
            .await?;
        if let Some(owner) = owner {
            self.attach_instructor(graph, owner).await?;
        }

        Ok(detail_node(graph, model))
    }

    async fn load_course(
        &self,
        graph: &mut EntityGraph,
        id: Uuid,
    ) -> Result<Key<Course>, PersistenceError> {
        if let Some(key) = graph.find::<Course>(id) {
            let binding = self.token.bind();
            graph[key].reviews.rebind(binding.clone());
            graph[key].students.rebind(binding);
            return Ok(key);
        }

        let model = course::Entity::find_by_id(id)
            .one(&self.txn)
            .await?
            .ok_or(PersistenceError::NotFound {
                entity: Course::NAME,
                id,
            })?;
        self.attach_course(graph, model).await
    }

    async fn attach_course(
        &self,
        graph: &mut EntityGraph,
        model: course::Model,
    ) -> Result<Key<Course>, PersistenceError> {
        let instructor = match model.instructor_id {
            Some(instructor_id) => Some(self.load_instructor(graph, instructor_id).await?),
            None => None,
        };

        let (key, fresh) = course_node(graph, model, self.token.bind());
        if fresh && let Some(instructor) = instructor {
            graph[key].instructor = Some(instructor);
            graph[instructor].courses.note_loaded(key);
        }
        Ok(key)
    }

    async fn load_review(
        &self,
        graph: &mut EntityGraph,
        id: Uuid,
    ) -> Result<Key<Review>, PersistenceError> {
        if let Some(key) = graph.find::<Review>(id) {
            return Ok(key);
        }

        let model = review::Entity::find_by_id(id)
            .one(&self.txn)
            .await?
            .ok_or(PersistenceError::NotFound {
                entity: Review::NAME,
                id,
            })?;
        let course = self.load_course(graph, model.course_id).await?;

        let key = graph.insert(Review::new(&model.comment));
        graph.assign_id(key, Some(model.id));
        graph[key].course = Some(course);
        graph[course].reviews.note_loaded(key);
        Ok(key)
    }

    async fn load_student(
        &self,
        graph: &mut EntityGraph,
        id: Uuid,
    ) -> Result<Key<Student>, PersistenceError> {
        if let Some(key) = graph.find::<Student>(id) {
            graph[key].courses.rebind(self.token.bind());
            return Ok(key);
        }

        let model = student::Entity::find_by_id(id)
            .one(&self.txn)
            .await?
            .ok_or(PersistenceError::NotFound {
                entity: Student::NAME,
                id,
            })?;
        Ok(student_node(graph, model, self.token.bind()))
    }

    /// The stored id of an owner whose collection still has to be fetched
    /// through this session, or `None` when it is already fetched
    fn pending_owner(
        &self,
        binding: Option<&SessionBinding>,
        owner: Option<Uuid>,
        association: Association,
    ) -> Result<Option<Uuid>, PersistenceError> {
        match (binding, owner) {
            (None, _) => Ok(None),
            (Some(binding), Some(id)) if binding.belongs_to(&self.token) => Ok(Some(id)),
            _ => Err(PersistenceError::DetachedAccess { association }),
        }
    }

    /// Fetches `Instructor.courses`
    pub async fn fetch_instructor_courses(
        &self,
        graph: &mut EntityGraph,
        instructor: Key<Instructor>,
    ) -> Result<Vec<Key<Course>>, PersistenceError> {
        let Some(instructor_id) = self.pending_owner(
            graph[instructor].courses.binding(),
            graph.id_of(instructor),
            Association::InstructorCourses,
        )?
        else {
            return Ok(graph[instructor].courses.queued_or_fetched().to_vec());
        };

        let rows = course::Entity::find()
            .filter(course::Column::InstructorId.eq(instructor_id))
            .all(&self.txn)
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let (key, fresh) = course_node(graph, row, self.token.bind());
            // A course moved to someone else in memory stays there
            if fresh || graph[key].instructor == Some(instructor) {
                graph[key].instructor = Some(instructor);
                keys.push(key);
            }
        }

        debug!(
            "Session {}: fetched {} courses of instructor {instructor_id}",
            self.id(),
            keys.len()
        );
        graph[instructor].courses.resolve(keys);
        Ok(graph[instructor].courses.queued_or_fetched().to_vec())
    }

    /// Fetches `Course.reviews`
    pub async fn fetch_reviews(
        &self,
        graph: &mut EntityGraph,
        course: Key<Course>,
    ) -> Result<Vec<Key<Review>>, PersistenceError> {
        let Some(course_id) = self.pending_owner(
            graph[course].reviews.binding(),
            graph.id_of(course),
            Association::CourseReviews,
        )?
        else {
            return Ok(graph[course].reviews.queued_or_fetched().to_vec());
        };

        let rows = review::Entity::find()
            .filter(review::Column::CourseId.eq(course_id))
            .all(&self.txn)
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            match graph.find::<Review>(row.id) {
                Some(key) if graph[key].course == Some(course) => keys.push(key),
                Some(_) => {}
                None => {
                    let key = graph.insert(Review::new(&row.comment));
                    graph.assign_id(key, Some(row.id));
                    graph[key].course = Some(course);
                    keys.push(key);
                }
            }
        }

        debug!(
            "Session {}: fetched {} reviews of course {course_id}",
            self.id(),
            keys.len()
        );
        graph[course].reviews.resolve(keys);
        Ok(graph[course].reviews.queued_or_fetched().to_vec())
    }

    /// Fetches `Course.students`
    pub async fn fetch_students(
        &self,
        graph: &mut EntityGraph,
        course: Key<Course>,
    ) -> Result<Vec<Key<Student>>, PersistenceError> {
        let Some(course_id) = self.pending_owner(
            graph[course].students.binding(),
            graph.id_of(course),
            Association::CourseStudents,
        )?
        else {
            return Ok(graph[course].students.queued_or_fetched().to_vec());
        };

        let rows = course_student::Entity::find()
            .filter(course_student::Column::CourseId.eq(course_id))
            .find_also_related(student::Entity)
            .all(&self.txn)
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for (_, row) in rows {
            let Some(row) = row else { continue };
            let key = student_node(graph, row, self.token.bind());
            graph[key].courses.note_loaded(course);
            keys.push(key);
        }

        debug!(
            "Session {}: fetched {} students of course {course_id}",
            self.id(),
            keys.len()
        );
        graph[course].students.resolve(keys);
        Ok(graph[course].students.queued_or_fetched().to_vec())
    }

    /// Fetches `Student.courses`, loading each course's instructor eagerly
    pub async fn fetch_student_courses(
        &self,
        graph: &mut EntityGraph,
        student: Key<Student>,
    ) -> Result<Vec<Key<Course>>, PersistenceError> {
        let Some(student_id) = self.pending_owner(
            graph[student].courses.binding(),
            graph.id_of(student),
            Association::StudentCourses,
        )?
        else {
            return Ok(graph[student].courses.queued_or_fetched().to_vec());
        };

        let rows = course_student::Entity::find()
            .filter(course_student::Column::StudentId.eq(student_id))
            .find_also_related(course::Entity)
            .all(&self.txn)
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for (_, row) in rows {
            let Some(row) = row else { continue };
            let key = match graph.find::<Course>(row.id) {
                Some(key) => key,
                None => self.attach_course(graph, row).await?,
            };
            graph[key].students.note_loaded(student);
            keys.push(key);
        }

        debug!(
            "Session {}: fetched {} courses of student {student_id}",
            self.id(),
            keys.len()
        );
        graph[student].courses.resolve(keys);
        Ok(graph[student].courses.queued_or_fetched().to_vec())
    }

    /// Overwrites a node's scalar fields with what is stored. Links are left
    /// alone. Useful after `update_bulk`, which bypasses the graph.
    pub async fn refresh(
        &self,
        graph: &mut EntityGraph,
        node: impl Into<NodeRef>,
    ) -> Result<(), PersistenceError> {
        let node = node.into();
        let entity = node.entity_name();
        let id = graph
            .node_id(node)
            .ok_or(PersistenceError::Unsaved { entity })?;
        let not_found = PersistenceError::NotFound { entity, id };
        let txn = &self.txn;

        match node {
            NodeRef::Instructor(key) => {
                let row = instructor::Entity::find_by_id(id).one(txn).await?.ok_or(not_found)?;
                let instructor = &mut graph[key];
                instructor.first_name = row.first_name;
                instructor.last_name = row.last_name;
                instructor.email = row.email;
            }
            NodeRef::InstructorDetail(key) => {
                let row = instructor_detail::Entity::find_by_id(id)
                    .one(txn)
                    .await?
                    .ok_or(not_found)?;
                let detail = &mut graph[key];
                detail.youtube_channel = row.youtube_channel;
                detail.hobby = row.hobby;
            }
            NodeRef::Course(key) => {
                let row = course::Entity::find_by_id(id).one(txn).await?.ok_or(not_found)?;
                graph[key].title = row.title;
            }
            NodeRef::Review(key) => {
                let row = review::Entity::find_by_id(id).one(txn).await?.ok_or(not_found)?;
                graph[key].comment = row.comment;
            }
            NodeRef::Student(key) => {
                let row = student::Entity::find_by_id(id).one(txn).await?.ok_or(not_found)?;
                let student = &mut graph[key];
                student.first_name = row.first_name;
                student.last_name = row.last_name;
                student.email = row.email;
            }
        }

        debug!("Session {}: refreshed {entity} {id}", self.id());
        Ok(())
    }
}

fn detail_node(graph: &mut EntityGraph, model: instructor_detail::Model) -> Key<InstructorDetail> {
    if let Some(key) = graph.find::<InstructorDetail>(model.id) {
        return key;
    }
    let key = graph.insert(InstructorDetail::new(&model.youtube_channel, &model.hobby));
    graph.assign_id(key, Some(model.id));
    key
}

/// Finds or inserts a course node; `true` when it was inserted
fn course_node(graph: &mut EntityGraph, model: course::Model, binding: SessionBinding) -> (Key<Course>, bool) {
    if let Some(key) = graph.find::<Course>(model.id) {
        graph[key].reviews.rebind(binding.clone());
        graph[key].students.rebind(binding);
        return (key, false);
    }

    let mut node = Course::new(&model.title);
    node.reviews = Collection::pending(binding.clone());
    node.students = Collection::pending(binding);
    let key = graph.insert(node);
    graph.assign_id(key, Some(model.id));
    (key, true)
}

fn student_node(graph: &mut EntityGraph, model: student::Model, binding: SessionBinding) -> Key<Student> {
    if let Some(key) = graph.find::<Student>(model.id) {
        graph[key].courses.rebind(binding);
        return key;
    }

    let mut node = Student::new(&model.first_name, &model.last_name, &model.email);
    node.courses = Collection::pending(binding);
    let key = graph.insert(node);
    graph.assign_id(key, Some(model.id));
    key
}
