use super::{Session, delete};
use crate::{
    entities::{course, course_student, instructor, instructor_detail, review, student},
    error::PersistenceError,
};
use log::{debug, info};
use models::{
    Association, Course, EntityGraph, GraphError, GraphNode, Instructor, InstructorDetail, Key,
    Mappings, NodeRef, Review, Student,
};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QuerySelect, sea_query::Expr,
};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Everything one save touches, worked out before any row is written
#[derive(Default)]
struct SavePlan {
    /// Nodes reached through save cascades, root first
    visited: Vec<NodeRef>,
    /// Links to nodes outside the cascade, whose rows must already exist
    referenced: Vec<(NodeRef, NodeRef, Association)>,
    /// Ids of visited nodes, fresh ones included
    ids: HashMap<NodeRef, Uuid>,
    /// Nodes that received their id from this save
    assigned: Vec<NodeRef>,
}

impl SavePlan {
    fn build(graph: &EntityGraph, root: NodeRef, mappings: &Mappings) -> Result<Self, GraphError> {
        let mut plan = Self::default();
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);

        while let Some(node) = queue.pop_front() {
            graph.check_links(node)?;
            plan.visited.push(node);

            for (association, target) in edges(graph, node)? {
                if !mappings.policy(association).cascades_save() {
                    plan.referenced.push((node, target, association));
                } else if seen.insert(target) {
                    queue.push_back(target);
                }
            }
        }

        Ok(plan)
    }

    fn of<T: GraphNode>(&self) -> impl Iterator<Item = Key<T>> + '_ {
        self.visited.iter().filter_map(|&node| T::key_of(node))
    }

    fn id<T: GraphNode>(&self, key: Key<T>) -> Option<Uuid> {
        self.ids.get(&T::node_ref(key)).copied()
    }

    fn is_new(&self, node: NodeRef) -> bool {
        self.assigned.contains(&node)
    }
}

/// The outgoing links of a node, as (association, target) pairs
fn edges(graph: &EntityGraph, node: NodeRef) -> Result<Vec<(Association, NodeRef)>, GraphError> {
    let mut edges: Vec<(Association, NodeRef)> = Vec::new();

    match node {
        NodeRef::Instructor(key) => {
            let instructor = &graph[key];
            if let Some(detail) = instructor.detail {
                edges.push((Association::InstructorDetail, NodeRef::InstructorDetail(detail)));
            }
            for &course in instructor.courses.queued_or_fetched() {
                edges.push((Association::InstructorCourses, NodeRef::Course(course)));
            }
        }
        NodeRef::InstructorDetail(key) => {
            if let Some(instructor) = graph[key].instructor {
                edges.push((Association::DetailInstructor, NodeRef::Instructor(instructor)));
            }
        }
        NodeRef::Course(key) => {
            let course = &graph[key];
            if let Some(instructor) = course.instructor {
                edges.push((Association::CourseInstructor, NodeRef::Instructor(instructor)));
            }
            for &review in course.reviews.queued_or_fetched() {
                edges.push((Association::CourseReviews, NodeRef::Review(review)));
            }
            for &student in course.students.queued_or_fetched() {
                edges.push((Association::CourseStudents, NodeRef::Student(student)));
            }
        }
        NodeRef::Review(key) => match graph[key].course {
            Some(course) => edges.push((Association::ReviewCourse, NodeRef::Course(course))),
            None => {
                return Err(GraphError::Unowned {
                    node: node.to_string(),
                    owner: Course::NAME,
                });
            }
        },
        NodeRef::Student(key) => {
            for &course in graph[key].courses.queued_or_fetched() {
                edges.push((Association::StudentCourses, NodeRef::Course(course)));
            }
        }
    }

    Ok(edges)
}

impl Session {
    /// Inserts or updates `root` and everything reachable from it through
    /// save cascades, in one go. Related entities outside the cascade must
    /// already be stored. On failure nothing is kept: ids handed out by this
    /// call are taken back and the session only allows a rollback.
    pub async fn save(
        &mut self,
        graph: &mut EntityGraph,
        root: impl Into<NodeRef>,
    ) -> Result<Uuid, PersistenceError> {
        let root = root.into();
        let result = self.save_node(graph, root).await;
        self.track(result)
    }

    async fn save_node(&self, graph: &mut EntityGraph, root: NodeRef) -> Result<Uuid, PersistenceError> {
        let mut plan = SavePlan::build(graph, root, &self.mappings)?;
        debug!(
            "Session {}: saving {root} with {} cascaded nodes",
            self.id(),
            plan.visited.len()
        );

        self.check_references(graph, &plan).await?;

        for &node in &plan.visited {
            let id = match graph.node_id(node) {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4();
                    assign(graph, node, Some(id));
                    plan.assigned.push(node);
                    id
                }
            };
            plan.ids.insert(node, id);
        }

        let removed = match self.write(graph, &plan).await {
            Ok(removed) => removed,
            Err(e) => {
                for &node in &plan.assigned {
                    assign(graph, node, None);
                }
                return Err(e);
            }
        };
        // Only forget removed nodes once every write went through
        removed.evict_from(graph);

        info!(
            "Session {}: saved {root}, {} inserted and {} updated",
            self.id(),
            plan.assigned.len(),
            plan.visited.len() - plan.assigned.len()
        );

        plan.ids
            .get(&root)
            .copied()
            .ok_or(PersistenceError::Unsaved {
                entity: root.entity_name(),
            })
    }

    /// Fails with `TransientEntity` when a link leaves the cascade towards a
    /// node whose row does not exist
    async fn check_references(&self, graph: &EntityGraph, plan: &SavePlan) -> Result<(), PersistenceError> {
        let visited: HashSet<NodeRef> = plan.visited.iter().copied().collect();
        let mut verified = HashSet::new();

        for &(from, target, association) in &plan.referenced {
            if visited.contains(&target) || !verified.insert(target) {
                continue;
            }

            let transient = PersistenceError::TransientEntity {
                entity: from.entity_name(),
                related: target.entity_name(),
                association,
            };
            let Some(id) = graph.node_id(target) else {
                return Err(transient);
            };
            if !self.exists(target, id).await? {
                return Err(transient);
            }
        }

        Ok(())
    }

    async fn exists(&self, node: NodeRef, id: Uuid) -> Result<bool, DbErr> {
        let txn = &self.txn;
        let found = match node {
            NodeRef::Instructor(_) => instructor::Entity::find_by_id(id).one(txn).await?.is_some(),
            NodeRef::InstructorDetail(_) => instructor_detail::Entity::find_by_id(id)
                .one(txn)
                .await?
                .is_some(),
            NodeRef::Course(_) => course::Entity::find_by_id(id).one(txn).await?.is_some(),
            NodeRef::Review(_) => review::Entity::find_by_id(id).one(txn).await?.is_some(),
            NodeRef::Student(_) => student::Entity::find_by_id(id).one(txn).await?.is_some(),
        };
        Ok(found)
    }

    async fn write(&self, graph: &EntityGraph, plan: &SavePlan) -> Result<delete::Removed, PersistenceError> {
        // Referenced rows first so every foreign key resolves
        for key in plan.of::<InstructorDetail>() {
            let detail = &graph[key];
            let id = plan.id(key).unwrap_or_default();
            let model = instructor_detail::ActiveModel {
                id: Set(id),
                youtube_channel: Set(detail.youtube_channel.clone()),
                hobby: Set(detail.hobby.clone()),
            };
            self.put(model, plan.is_new(key.into()), InstructorDetail::NAME, id)
                .await?;
        }

        for key in plan.of::<Instructor>() {
            let instructor = &graph[key];
            let id = plan.id(key).unwrap_or_default();
            let model = instructor::ActiveModel {
                id: Set(id),
                first_name: Set(instructor.first_name.clone()),
                last_name: Set(instructor.last_name.clone()),
                email: Set(instructor.email.clone()),
                instructor_detail_id: Set(instructor.detail.and_then(|d| graph.id_of(d))),
            };
            self.put(model, plan.is_new(key.into()), Instructor::NAME, id)
                .await?;
        }

        for key in plan.of::<Course>() {
            let course = &graph[key];
            let id = plan.id(key).unwrap_or_default();
            let model = course::ActiveModel {
                id: Set(id),
                title: Set(course.title.clone()),
                instructor_id: Set(course.instructor.and_then(|i| graph.id_of(i))),
            };
            self.put(model, plan.is_new(key.into()), Course::NAME, id)
                .await?;
        }

        for key in plan.of::<Student>() {
            let student = &graph[key];
            let id = plan.id(key).unwrap_or_default();
            let model = student::ActiveModel {
                id: Set(id),
                first_name: Set(student.first_name.clone()),
                last_name: Set(student.last_name.clone()),
                email: Set(student.email.clone()),
            };
            self.put(model, plan.is_new(key.into()), Student::NAME, id)
                .await?;
        }

        for key in plan.of::<Review>() {
            let review = &graph[key];
            let id = plan.id(key).unwrap_or_default();
            let Some(course_id) = review.course.and_then(|c| graph.id_of(c)) else {
                return Err(GraphError::Unowned {
                    node: NodeRef::Review(key).to_string(),
                    owner: Course::NAME,
                }
                .into());
            };
            let model = review::ActiveModel {
                id: Set(id),
                comment: Set(review.comment.clone()),
                course_id: Set(course_id),
            };
            self.put(model, plan.is_new(key.into()), Review::NAME, id)
                .await?;
        }

        self.sync_enrollments(graph, plan).await?;

        let mut removed = delete::Removed::default();
        for key in plan.of::<Course>() {
            if self.mappings.policy(Association::CourseReviews).removes_orphans()
                && graph[key].reviews.is_fetched()
            {
                self.remove_orphan_reviews(graph, key, &mut removed).await?;
            }
        }

        for key in plan.of::<Instructor>() {
            if graph[key].courses.is_fetched() {
                self.release_courses(graph, key, &mut removed).await?;
            }
        }

        Ok(removed)
    }

    /// Inserts a new row or updates the stored one
    async fn put<A>(
        &self,
        model: A,
        is_new: bool,
        entity: &'static str,
        id: Uuid,
    ) -> Result<(), PersistenceError>
    where
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    {
        if is_new {
            A::Entity::insert(model)
                .exec_without_returning(&self.txn)
                .await?;
            return Ok(());
        }

        match A::Entity::update(model).exec(&self.txn).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(PersistenceError::NotFound { entity, id }),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the join rows implied by the visited courses and students. A
    /// fetched `Course.students` is authoritative, so rows it no longer lists
    /// are removed; otherwise rows are only ever added.
    async fn sync_enrollments(&self, graph: &EntityGraph, plan: &SavePlan) -> Result<(), PersistenceError> {
        let mut wanted: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        let mut authoritative = HashSet::new();

        for key in plan.of::<Course>() {
            let Some(course_id) = plan.id(key) else { continue };
            let course = &graph[key];
            let students = wanted.entry(course_id).or_default();
            students.extend(course.students.queued_or_fetched().iter().filter_map(|&s| graph.id_of(s)));
            if course.students.is_fetched() {
                authoritative.insert(course_id);
            }
        }

        for key in plan.of::<Student>() {
            let Some(student_id) = plan.id(key) else { continue };
            for &course in graph[key].courses.queued_or_fetched() {
                if let Some(course_id) = graph.id_of(course) {
                    wanted.entry(course_id).or_default().insert(student_id);
                }
            }
        }

        for (course_id, students) in wanted {
            let existing: HashSet<Uuid> = course_student::Entity::find()
                .filter(course_student::Column::CourseId.eq(course_id))
                .all(&self.txn)
                .await?
                .into_iter()
                .map(|row| row.student_id)
                .collect();

            let missing: Vec<course_student::ActiveModel> = students
                .iter()
                .filter(|id| !existing.contains(id))
                .map(|&student_id| course_student::ActiveModel {
                    course_id: Set(course_id),
                    student_id: Set(student_id),
                })
                .collect();
            if !missing.is_empty() {
                debug!("Enrolling {} students in course {course_id}", missing.len());
                course_student::Entity::insert_many(missing)
                    .exec_without_returning(&self.txn)
                    .await?;
            }

            if authoritative.contains(&course_id) {
                let stale: Vec<Uuid> = existing.difference(&students).copied().collect();
                if !stale.is_empty() {
                    debug!("Unenrolling {} students from course {course_id}", stale.len());
                    course_student::Entity::delete_many()
                        .filter(course_student::Column::CourseId.eq(course_id))
                        .filter(course_student::Column::StudentId.is_in(stale))
                        .exec(&self.txn)
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Deletes review rows of a course that its fetched collection no longer
    /// holds. A review that now sits in another course is moved there instead.
    async fn remove_orphan_reviews(
        &self,
        graph: &EntityGraph,
        key: Key<Course>,
        removed: &mut delete::Removed,
    ) -> Result<(), PersistenceError> {
        let Some(course_id) = graph.id_of(key) else {
            return Ok(());
        };
        let keep: Vec<Uuid> = graph[key]
            .reviews
            .queued_or_fetched()
            .iter()
            .filter_map(|&r| graph.id_of(r))
            .collect();

        let dropped: Vec<Uuid> = review::Entity::find()
            .select_only()
            .column(review::Column::Id)
            .filter(review::Column::CourseId.eq(course_id))
            .filter(review::Column::Id.is_not_in(keep))
            .into_tuple()
            .all(&self.txn)
            .await?;

        let mut orphans = Vec::new();
        for id in dropped {
            let new_course = graph
                .find::<Review>(id)
                .and_then(|review| graph[review].course)
                .filter(|&course| course != key);
            match new_course {
                Some(course) => self.move_review(graph, id, course).await?,
                None => orphans.push(id),
            }
        }
        if orphans.is_empty() {
            return Ok(());
        }

        review::Entity::delete_many()
            .filter(review::Column::Id.is_in(orphans.clone()))
            .exec(&self.txn)
            .await?;
        info!("Removed {} orphaned reviews of course {course_id}", orphans.len());
        removed.reviews.extend(orphans);
        Ok(())
    }

    /// Points a stored review at its new course. If that course has no row
    /// yet the review stays put until the course itself is saved.
    async fn move_review(&self, graph: &EntityGraph, id: Uuid, course: Key<Course>) -> Result<(), DbErr> {
        let Some(course_id) = graph.id_of(course) else {
            return Ok(());
        };
        review::Entity::update_many()
            .col_expr(review::Column::CourseId, Expr::value(course_id))
            .filter(review::Column::Id.eq(id))
            .exec(&self.txn)
            .await?;
        debug!("Moved review {id} to course {course_id}");
        Ok(())
    }

    /// Handles courses dropped from an instructor's fetched collection: they
    /// are deleted under orphan removal, otherwise they lose their instructor.
    /// Courses handed to another instructor in memory follow that instructor.
    async fn release_courses(
        &self,
        graph: &EntityGraph,
        key: Key<Instructor>,
        removed: &mut delete::Removed,
    ) -> Result<(), PersistenceError> {
        let Some(instructor_id) = graph.id_of(key) else {
            return Ok(());
        };
        let keep: Vec<Uuid> = graph[key]
            .courses
            .queued_or_fetched()
            .iter()
            .filter_map(|&c| graph.id_of(c))
            .collect();

        let candidates: Vec<Uuid> = course::Entity::find()
            .select_only()
            .column(course::Column::Id)
            .filter(course::Column::InstructorId.eq(instructor_id))
            .filter(course::Column::Id.is_not_in(keep))
            .into_tuple()
            .all(&self.txn)
            .await?;

        let mut dropped = Vec::new();
        for course_id in candidates {
            let new_instructor = graph
                .find::<Course>(course_id)
                .and_then(|course| graph[course].instructor)
                .filter(|&instructor| instructor != key)
                .and_then(|instructor| graph.id_of(instructor));
            match new_instructor {
                Some(new_id) => {
                    course::Entity::update_many()
                        .col_expr(course::Column::InstructorId, Expr::value(new_id))
                        .filter(course::Column::Id.eq(course_id))
                        .exec(&self.txn)
                        .await?;
                    debug!("Moved course {course_id} to instructor {new_id}");
                }
                None => dropped.push(course_id),
            }
        }
        if dropped.is_empty() {
            return Ok(());
        }

        if self.mappings.policy(Association::InstructorCourses).removes_orphans() {
            let before = removed.courses.len();
            for course_id in dropped {
                delete::delete_course_rows(&self.txn, &self.mappings, course_id, removed).await?;
            }
            info!(
                "Removed {} orphaned courses of instructor {instructor_id}",
                removed.courses.len() - before
            );
        } else {
            let released = course::Entity::update_many()
                .col_expr(course::Column::InstructorId, Expr::value(Option::<Uuid>::None))
                .filter(course::Column::Id.is_in(dropped))
                .exec(&self.txn)
                .await?;
            debug!(
                "Released {} courses from instructor {instructor_id}",
                released.rows_affected
            );
        }
        Ok(())
    }
}

fn assign(graph: &mut EntityGraph, node: NodeRef, id: Option<Uuid>) {
    match node {
        NodeRef::Instructor(key) => graph.assign_id(key, id),
        NodeRef::InstructorDetail(key) => graph.assign_id(key, id),
        NodeRef::Course(key) => graph.assign_id(key, id),
        NodeRef::Review(key) => graph.assign_id(key, id),
        NodeRef::Student(key) => graph.assign_id(key, id),
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        PersistenceError, save_graph,
        entities::{course, course_student, review, student},
        testing,
    };
    use models::{Association, Course, EntityGraph, GraphError, Instructor, Review, Student};
    use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
    use uuid::Uuid;

    fn course_with_reviews(graph: &mut EntityGraph) -> (models::Key<Course>, Vec<models::Key<Review>>) {
        let course = graph.insert(Course::new("Pacman - How to score one million points"));
        let reviews = ["Great course ... loved it!", "Cool course, job well done.", "What a dumb course, you are an idiot!"]
            .into_iter()
            .map(|comment| {
                let review = graph.insert(Review::new(comment));
                graph.add_review(course, review);
                review
            })
            .collect();
        (course, reviews)
    }

    #[tokio::test]
    async fn test_save_cascades_reviews() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let (course, reviews) = course_with_reviews(&mut graph);

        let course_id = save_graph(&factory, &mut graph, course).await.unwrap();
        assert_eq!(graph.id_of(course), Some(course_id));

        let rows = review::Entity::find()
            .filter(review::Column::CourseId.eq(course_id))
            .all(factory.connection())
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        for review in reviews {
            let id = graph.id_of(review).unwrap();
            assert!(rows.iter().any(|row| row.id == id));
        }
    }

    #[tokio::test]
    async fn test_removed_review_is_deleted() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let (course, _) = course_with_reviews(&mut graph);
        let course_id = save_graph(&factory, &mut graph, course).await.unwrap();

        let mut graph = EntityGraph::new();
        let mut session = factory.open_session().await.unwrap();
        let course = session.load::<Course>(&mut graph, course_id).await.unwrap();
        let reviews = session.fetch_reviews(&mut graph, course).await.unwrap();
        assert_eq!(reviews.len(), 3);

        let removed = reviews[0];
        let removed_id = graph.id_of(removed).unwrap();
        assert_eq!(graph.remove_review(course, removed), Ok(true));
        session.save(&mut graph, course).await.unwrap();
        session.commit().await.unwrap();

        // The review forgets its id, the course stays
        assert_eq!(graph.id_of(removed), None);
        let db = factory.connection();
        assert!(review::Entity::find_by_id(removed_id).one(db).await.unwrap().is_none());
        assert_eq!(review::Entity::find().count(db).await.unwrap(), 2);
        assert!(course::Entity::find_by_id(course_id).one(db).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_existing_student_joins_new_course() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let student = graph.insert(Student::new("John", "Doe", "john@luv2code.com"));
        let student_id = save_graph(&factory, &mut graph, student).await.unwrap();

        let course = graph.insert(Course::new("Rubik's Cube - How to Speed Cube"));
        graph.add_student(course, student);
        let course_id = save_graph(&factory, &mut graph, course).await.unwrap();
        // Saving again must not duplicate anything
        save_graph(&factory, &mut graph, course).await.unwrap();

        let db = factory.connection();
        assert_eq!(student::Entity::find().count(db).await.unwrap(), 1);
        let joins = course_student::Entity::find().all(db).await.unwrap();
        assert_eq!(
            joins,
            vec![course_student::Model {
                course_id,
                student_id
            }]
        );
    }

    #[tokio::test]
    async fn test_loaded_student_joins_courses() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let student = graph.insert(Student::new("Mary", "Public", "mary@luv2code.com"));
        let student_id = save_graph(&factory, &mut graph, student).await.unwrap();

        let mut graph = EntityGraph::new();
        let mut session = factory.open_session().await.unwrap();
        let student = session.load::<Student>(&mut graph, student_id).await.unwrap();
        for title in ["Rubik's Cube - How to Speed Cube", "Atari 2600 - Game Development"] {
            let course = graph.insert(Course::new(title));
            graph.add_student(course, student);
            session.save(&mut graph, course).await.unwrap();
        }
        session.commit().await.unwrap();

        let db = factory.connection();
        let joins = course_student::Entity::find()
            .filter(course_student::Column::StudentId.eq(student_id))
            .count(db)
            .await
            .unwrap();
        assert_eq!(joins, 2);
        assert_eq!(student::Entity::find().count(db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unsaved_course_of_student_is_transient() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let student = graph.insert(Student::new("Daffy", "Duck", "daffy@luv2code.com"));
        let course = graph.insert(Course::new("Pacman - How to score one million points"));
        graph.add_student(course, student);

        let mut session = factory.open_session().await.unwrap();
        let result = session.save(&mut graph, student).await;
        assert!(matches!(
            result,
            Err(PersistenceError::TransientEntity {
                entity: "Student",
                related: "Course",
                association: Association::StudentCourses,
            })
        ));
        assert_eq!(graph.id_of(student), None);
        assert!(session.is_failed());
        assert!(matches!(
            session.commit().await,
            Err(PersistenceError::RolledBack)
        ));

        let db = factory.connection();
        assert_eq!(student::Entity::find().count(db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_save_clears_assigned_ids() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let first = graph.insert(Course::new("Pacman - How to score one million points"));
        save_graph(&factory, &mut graph, first).await.unwrap();

        // Same title violates the unique constraint once the course is written
        let (course, reviews) = course_with_reviews(&mut graph);
        let mut session = factory.open_session().await.unwrap();
        let result = session.save(&mut graph, course).await;
        assert!(matches!(result, Err(PersistenceError::Db(_))));
        assert_eq!(graph.id_of(course), None);
        for review in reviews {
            assert_eq!(graph.id_of(review), None);
        }
        assert!(session.commit().await.is_err());

        let db = factory.connection();
        assert_eq!(course::Entity::find().count(db).await.unwrap(), 1);
        assert_eq!(review::Entity::find().count(db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_one_sided_link_is_rejected() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let course = graph.insert(Course::new("Atari 2600 - Game Development"));
        let review = graph.insert(Review::new("Great Course... loved it"));
        graph[course].reviews.add(review);

        let result = save_graph(&factory, &mut graph, course).await;
        assert!(matches!(
            result,
            Err(PersistenceError::Graph(GraphError::Inconsistent {
                association: Association::CourseReviews,
                ..
            }))
        ));
        assert_eq!(graph.id_of(course), None);
        let db = factory.connection();
        assert_eq!(course::Entity::find().count(db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_review_needs_a_course() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let review = graph.insert(Review::new("Lonely review"));

        let result = save_graph(&factory, &mut graph, review).await;
        assert!(matches!(
            result,
            Err(PersistenceError::Graph(GraphError::Unowned { owner: "Course", .. }))
        ));
    }

    #[tokio::test]
    async fn test_save_updates_loaded_student() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let student = graph.insert(Student::new("Paul", "Doe", "paul@luv2code.com"));
        let id = save_graph(&factory, &mut graph, student).await.unwrap();

        let mut graph = EntityGraph::new();
        let mut session = factory.open_session().await.unwrap();
        let student = session.load::<Student>(&mut graph, id).await.unwrap();
        graph[student].first_name = "Scooby".to_owned();
        assert_eq!(session.save(&mut graph, student).await.unwrap(), id);
        session.commit().await.unwrap();

        let row = student::Entity::find_by_id(id)
            .one(factory.connection())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.first_name, "Scooby");
    }

    #[tokio::test]
    async fn test_update_of_missing_row_is_not_found() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let student = graph.insert(Student::new("Ghost", "Student", "ghost@luv2code.com"));
        let id = Uuid::new_v4();
        graph.assign_id(student, Some(id));

        let result = save_graph(&factory, &mut graph, student).await;
        assert!(matches!(
            result,
            Err(PersistenceError::NotFound { entity: "Student", id: missing }) if missing == id
        ));
        // Ids the caller set are left alone
        assert_eq!(graph.id_of(student), Some(id));
    }

    #[tokio::test]
    async fn test_dropped_course_loses_instructor() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let instructor = graph.insert(Instructor::new("Susan", "Public", "susan.public@luv2code.com"));
        let kept = graph.insert(Course::new("Air Guitar - The Ultimate Guide"));
        let dropped = graph.insert(Course::new("The Pinball Masterclass"));
        graph.add_course(instructor, kept);
        graph.add_course(instructor, dropped);
        let instructor_id = save_graph(&factory, &mut graph, instructor).await.unwrap();
        let dropped_id = graph.id_of(dropped).unwrap();

        let mut graph = EntityGraph::new();
        let mut session = factory.open_session().await.unwrap();
        let instructor = session.load::<Instructor>(&mut graph, instructor_id).await.unwrap();
        let courses = session.fetch_instructor_courses(&mut graph, instructor).await.unwrap();
        assert_eq!(courses.len(), 2);
        let dropped = graph.find::<Course>(dropped_id).unwrap();
        assert_eq!(graph.remove_course(instructor, dropped), Ok(true));
        session.save(&mut graph, instructor).await.unwrap();
        session.commit().await.unwrap();

        let row = course::Entity::find_by_id(dropped_id)
            .one(factory.connection())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.instructor_id, None);
    }

    #[tokio::test]
    async fn test_review_moved_to_other_course_is_kept() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let (first, _) = course_with_reviews(&mut graph);
        let second = graph.insert(Course::new("Atari 2600 - Game Development"));
        let first_id = save_graph(&factory, &mut graph, first).await.unwrap();
        let second_id = save_graph(&factory, &mut graph, second).await.unwrap();

        let mut graph = EntityGraph::new();
        let mut session = factory.open_session().await.unwrap();
        let first = session.load::<Course>(&mut graph, first_id).await.unwrap();
        let second = session.load::<Course>(&mut graph, second_id).await.unwrap();
        let reviews = session.fetch_reviews(&mut graph, first).await.unwrap();
        session.fetch_reviews(&mut graph, second).await.unwrap();

        let moved = reviews[0];
        let moved_id = graph.id_of(moved).unwrap();
        graph.add_review(second, moved);

        // Saving the old course first leaves the review alone in memory
        session.save(&mut graph, first).await.unwrap();
        assert_eq!(graph.id_of(moved), Some(moved_id));
        assert_eq!(graph[moved].course, Some(second));
        assert_eq!(
            graph[second].reviews.fetched(Association::CourseReviews),
            Ok(&[moved][..])
        );

        session.save(&mut graph, second).await.unwrap();
        session.commit().await.unwrap();

        let db = factory.connection();
        let row = review::Entity::find_by_id(moved_id).one(db).await.unwrap().unwrap();
        assert_eq!(row.course_id, second_id);
        assert_eq!(review::Entity::find().count(db).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_review_moved_to_new_course_is_kept() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let (first, reviews) = course_with_reviews(&mut graph);
        save_graph(&factory, &mut graph, first).await.unwrap();

        let moved = reviews[1];
        let moved_id = graph.id_of(moved).unwrap();
        let second = graph.insert(Course::new("Rubik's Cube - How to Speed Cube"));
        graph.add_review(second, moved);

        let mut session = factory.open_session().await.unwrap();
        session.save(&mut graph, first).await.unwrap();
        assert_eq!(graph.id_of(moved), Some(moved_id));
        let second_id = session.save(&mut graph, second).await.unwrap();
        session.commit().await.unwrap();

        let db = factory.connection();
        let row = review::Entity::find_by_id(moved_id).one(db).await.unwrap().unwrap();
        assert_eq!(row.course_id, second_id);
        assert_eq!(review::Entity::find().count(db).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_course_moved_to_other_instructor_follows_it() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let first = graph.insert(Instructor::new("Susan", "Public", "susan.public@luv2code.com"));
        let second = graph.insert(Instructor::new("Madhu", "Patel", "madhu@luv2code.com"));
        let course = graph.insert(Course::new("The Pinball Masterclass"));
        graph.add_course(first, course);
        save_graph(&factory, &mut graph, first).await.unwrap();
        let second_id = save_graph(&factory, &mut graph, second).await.unwrap();

        graph.add_course(second, course);
        let mut session = factory.open_session().await.unwrap();
        session.save(&mut graph, first).await.unwrap();
        session.commit().await.unwrap();

        let row = course::Entity::find_by_id(graph.id_of(course).unwrap())
            .one(factory.connection())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.instructor_id, Some(second_id));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_removed_reviews_in_graph() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let instructor = graph.insert(Instructor::new("Susan", "Public", "susan.public@luv2code.com"));
        let (first, first_reviews) = course_with_reviews(&mut graph);
        let second = graph.insert(Course::new("Atari 2600 - Game Development"));
        let stray = graph.insert(Review::new("Worth every penny"));
        graph.add_review(second, stray);
        graph.add_course(instructor, first);
        graph.add_course(instructor, second);
        save_graph(&factory, &mut graph, instructor).await.unwrap();

        // A course that claims a row it does not have
        let ghost = graph.insert(Course::new("Ghost Course"));
        graph.assign_id(ghost, Some(Uuid::new_v4()));

        let dropped = first_reviews[0];
        let dropped_id = graph.id_of(dropped).unwrap();
        assert_eq!(graph.remove_review(first, dropped), Ok(true));
        graph.add_review(ghost, stray);

        let mut session = factory.open_session().await.unwrap();
        assert!(session.save(&mut graph, instructor).await.is_err());
        session.rollback().await.unwrap();

        // The review removed before the failing write is still known
        assert_eq!(graph.id_of(dropped), Some(dropped_id));
        assert_eq!(graph.find::<Review>(dropped_id), Some(dropped));
        let db = factory.connection();
        assert!(review::Entity::find_by_id(dropped_id).one(db).await.unwrap().is_some());
        assert_eq!(review::Entity::find().count(db).await.unwrap(), 4);
    }
}
