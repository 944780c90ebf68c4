use super::Session;
use crate::{
    entities::{course, course_student, instructor, instructor_detail, review, student},
    error::PersistenceError,
};
use log::{debug, info};
use models::{
    Association, Course, EntityGraph, Instructor, InstructorDetail, Mappings, NodeRef, Review,
    Student,
};
use sea_orm::{
    ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QuerySelect,
    sea_query::Expr,
};
use uuid::Uuid;

/// Ids of every row a delete removed, so the graph can forget them afterwards
#[derive(Debug, Default)]
pub(super) struct Removed {
    pub instructors: Vec<Uuid>,
    pub details: Vec<Uuid>,
    pub courses: Vec<Uuid>,
    pub reviews: Vec<Uuid>,
    pub students: Vec<Uuid>,
}

impl Removed {
    fn total(&self) -> usize {
        self.instructors.len()
            + self.details.len()
            + self.courses.len()
            + self.reviews.len()
            + self.students.len()
    }

    pub(super) fn evict_from(&self, graph: &mut EntityGraph) {
        for &id in &self.reviews {
            if let Some(key) = graph.find::<Review>(id) {
                graph.evict(key.into());
            }
        }
        for &id in &self.courses {
            if let Some(key) = graph.find::<Course>(id) {
                graph.evict(key.into());
            }
        }
        for &id in &self.students {
            if let Some(key) = graph.find::<Student>(id) {
                graph.evict(key.into());
            }
        }
        for &id in &self.instructors {
            if let Some(key) = graph.find::<Instructor>(id) {
                graph.evict(key.into());
            }
        }
        for &id in &self.details {
            if let Some(key) = graph.find::<InstructorDetail>(id) {
                graph.evict(key.into());
            }
        }
    }
}

impl Session {
    /// Deletes a stored node along with whatever its delete cascades reach.
    /// Links without delete cascade are broken instead: foreign keys pointing
    /// at the node are cleared and join rows are dropped. Every removed node
    /// loses its id and its links in `graph`.
    pub async fn delete(
        &mut self,
        graph: &mut EntityGraph,
        node: impl Into<NodeRef>,
    ) -> Result<(), PersistenceError> {
        let node = node.into();
        let result = self.delete_node(graph, node).await;
        self.track(result)
    }

    async fn delete_node(&self, graph: &mut EntityGraph, node: NodeRef) -> Result<(), PersistenceError> {
        let entity = node.entity_name();
        let id = graph
            .node_id(node)
            .ok_or(PersistenceError::Unsaved { entity })?;

        let txn = &self.txn;
        let mappings = &self.mappings;
        let mut removed = Removed::default();
        let found = match node {
            NodeRef::Instructor(_) => delete_instructor_rows(txn, mappings, id, &mut removed).await?,
            NodeRef::InstructorDetail(_) => delete_detail_rows(txn, mappings, id, &mut removed).await?,
            NodeRef::Course(_) => delete_course_rows(txn, mappings, id, &mut removed).await?,
            NodeRef::Review(_) => delete_review_rows(txn, id, &mut removed).await?,
            NodeRef::Student(_) => delete_student_rows(txn, id, &mut removed).await?,
        };
        if !found {
            return Err(PersistenceError::NotFound { entity, id });
        }

        info!(
            "Session {}: deleted {entity} {id}, {} rows removed in total",
            self.id(),
            removed.total()
        );
        removed.evict_from(graph);
        Ok(())
    }
}

pub(super) async fn delete_instructor_rows(
    txn: &DatabaseTransaction,
    mappings: &Mappings,
    id: Uuid,
    removed: &mut Removed,
) -> Result<bool, DbErr> {
    let Some(row) = instructor::Entity::find_by_id(id).one(txn).await? else {
        return Ok(false);
    };

    let courses: Vec<Uuid> = course::Entity::find()
        .select_only()
        .column(course::Column::Id)
        .filter(course::Column::InstructorId.eq(id))
        .into_tuple()
        .all(txn)
        .await?;
    if mappings.policy(Association::InstructorCourses).cascades_delete() {
        for course_id in courses {
            delete_course_rows(txn, mappings, course_id, removed).await?;
        }
    } else if !courses.is_empty() {
        debug!("Releasing {} courses of instructor {id}", courses.len());
        course::Entity::update_many()
            .col_expr(course::Column::InstructorId, Expr::value(Option::<Uuid>::None))
            .filter(course::Column::InstructorId.eq(id))
            .exec(txn)
            .await?;
    }

    if instructor::Entity::delete_by_id(id).exec(txn).await?.rows_affected > 0 {
        removed.instructors.push(id);
    }

    if let Some(detail_id) = row.instructor_detail_id
        && mappings.policy(Association::InstructorDetail).cascades_delete()
        && instructor_detail::Entity::delete_by_id(detail_id)
            .exec(txn)
            .await?
            .rows_affected
            > 0
    {
        removed.details.push(detail_id);
    }

    Ok(true)
}

pub(super) async fn delete_detail_rows(
    txn: &DatabaseTransaction,
    mappings: &Mappings,
    id: Uuid,
    removed: &mut Removed,
) -> Result<bool, DbErr> {
    if instructor_detail::Entity::find_by_id(id).one(txn).await?.is_none() {
        return Ok(false);
    }

    let owners: Vec<Uuid> = instructor::Entity::find()
        .select_only()
        .column(instructor::Column::Id)
        .filter(instructor::Column::InstructorDetailId.eq(id))
        .into_tuple()
        .all(txn)
        .await?;
    for owner in owners {
        if mappings.policy(Association::DetailInstructor).cascades_delete() {
            delete_instructor_rows(txn, mappings, owner, removed).await?;
        } else {
            debug!("Unlinking instructor {owner} from detail {id}");
            instructor::Entity::update_many()
                .col_expr(
                    instructor::Column::InstructorDetailId,
                    Expr::value(Option::<Uuid>::None),
                )
                .filter(instructor::Column::Id.eq(owner))
                .exec(txn)
                .await?;
        }
    }

    // The owning instructor may already have taken the detail with it
    if instructor_detail::Entity::delete_by_id(id)
        .exec(txn)
        .await?
        .rows_affected
        > 0
    {
        removed.details.push(id);
    }
    Ok(true)
}

pub(super) async fn delete_course_rows(
    txn: &DatabaseTransaction,
    mappings: &Mappings,
    id: Uuid,
    removed: &mut Removed,
) -> Result<bool, DbErr> {
    if course::Entity::find_by_id(id).one(txn).await?.is_none() {
        return Ok(false);
    }

    // Without delete cascade, remaining reviews make the course row undeletable
    if mappings.policy(Association::CourseReviews).cascades_delete() {
        let reviews: Vec<Uuid> = review::Entity::find()
            .select_only()
            .column(review::Column::Id)
            .filter(review::Column::CourseId.eq(id))
            .into_tuple()
            .all(txn)
            .await?;
        review::Entity::delete_many()
            .filter(review::Column::CourseId.eq(id))
            .exec(txn)
            .await?;
        removed.reviews.extend(reviews);
    }

    course_student::Entity::delete_many()
        .filter(course_student::Column::CourseId.eq(id))
        .exec(txn)
        .await?;
    course::Entity::delete_by_id(id).exec(txn).await?;
    removed.courses.push(id);
    Ok(true)
}

async fn delete_review_rows(
    txn: &DatabaseTransaction,
    id: Uuid,
    removed: &mut Removed,
) -> Result<bool, DbErr> {
    let result = review::Entity::delete_by_id(id).exec(txn).await?;
    if result.rows_affected == 0 {
        return Ok(false);
    }
    removed.reviews.push(id);
    Ok(true)
}

async fn delete_student_rows(
    txn: &DatabaseTransaction,
    id: Uuid,
    removed: &mut Removed,
) -> Result<bool, DbErr> {
    if student::Entity::find_by_id(id).one(txn).await?.is_none() {
        return Ok(false);
    }

    course_student::Entity::delete_many()
        .filter(course_student::Column::StudentId.eq(id))
        .exec(txn)
        .await?;
    student::Entity::delete_by_id(id).exec(txn).await?;
    removed.students.push(id);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use crate::{
        PersistenceError, save_graph,
        entities::{course, course_student, instructor, instructor_detail, review, student},
        testing,
    };
    use models::{
        Association, CascadePolicy, Course, EntityGraph, Instructor, InstructorDetail, Key,
        Mappings, Review, Student,
    };
    use sea_orm::{EntityTrait, PaginatorTrait};

    fn instructor_with_detail(graph: &mut EntityGraph) -> (Key<Instructor>, Key<InstructorDetail>) {
        let instructor = graph.insert(Instructor::new("Chad", "Darby", "darby@luv2code.com"));
        let detail = graph.insert(InstructorDetail::new(
            "http://www.luv2code.com/youtube",
            "Luv 2 code!!!",
        ));
        graph.set_detail(instructor, detail);
        (instructor, detail)
    }

    #[tokio::test]
    async fn test_delete_instructor_takes_detail() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let (instructor, detail) = instructor_with_detail(&mut graph);
        let instructor_id = save_graph(&factory, &mut graph, instructor).await.unwrap();
        let detail_id = graph.id_of(detail).unwrap();

        let db = factory.connection();
        assert!(instructor::Entity::find_by_id(instructor_id).one(db).await.unwrap().is_some());
        assert!(instructor_detail::Entity::find_by_id(detail_id).one(db).await.unwrap().is_some());

        let mut session = factory.open_session().await.unwrap();
        session.delete(&mut graph, instructor).await.unwrap();
        session.commit().await.unwrap();

        assert_eq!(graph.id_of(instructor), None);
        assert_eq!(graph.id_of(detail), None);
        assert_eq!(graph[instructor].detail, None);
        assert_eq!(instructor::Entity::find().count(db).await.unwrap(), 0);
        assert_eq!(instructor_detail::Entity::find().count(db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_instructor_keeps_courses() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let (instructor, _) = instructor_with_detail(&mut graph);
        let course = graph.insert(Course::new("Air Guitar - The Ultimate Guide"));
        graph.add_course(instructor, course);
        save_graph(&factory, &mut graph, instructor).await.unwrap();
        let course_id = graph.id_of(course).unwrap();

        let mut session = factory.open_session().await.unwrap();
        session.delete(&mut graph, instructor).await.unwrap();
        session.commit().await.unwrap();

        let row = course::Entity::find_by_id(course_id)
            .one(factory.connection())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.instructor_id, None);
        assert_eq!(graph[course].instructor, None);
        assert_eq!(graph.id_of(course), Some(course_id));
    }

    #[tokio::test]
    async fn test_delete_detail_breaks_link() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let (instructor, detail) = instructor_with_detail(&mut graph);
        let instructor_id = save_graph(&factory, &mut graph, instructor).await.unwrap();
        let detail_id = graph.id_of(detail).unwrap();

        let mut graph = EntityGraph::new();
        let mut session = factory.open_session().await.unwrap();
        let detail = session.load::<InstructorDetail>(&mut graph, detail_id).await.unwrap();
        let instructor = graph[detail].instructor.unwrap();
        session.delete(&mut graph, detail).await.unwrap();
        session.commit().await.unwrap();

        assert_eq!(graph[instructor].detail, None);
        assert_eq!(graph.id_of(instructor), Some(instructor_id));
        let db = factory.connection();
        let row = instructor::Entity::find_by_id(instructor_id)
            .one(db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.instructor_detail_id, None);
        assert_eq!(instructor_detail::Entity::find().count(db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_detail_takes_instructor_when_mapped() {
        let mappings = Mappings::default()
            .with(Association::DetailInstructor, CascadePolicy::All)
            .unwrap();
        let factory = testing::setup_with(mappings).await;
        let mut graph = EntityGraph::new();
        let (instructor, detail) = instructor_with_detail(&mut graph);
        save_graph(&factory, &mut graph, instructor).await.unwrap();

        let mut session = factory.open_session().await.unwrap();
        session.delete(&mut graph, detail).await.unwrap();
        session.commit().await.unwrap();

        assert_eq!(graph.id_of(instructor), None);
        assert_eq!(graph.id_of(detail), None);
        let db = factory.connection();
        assert_eq!(instructor::Entity::find().count(db).await.unwrap(), 0);
        assert_eq!(instructor_detail::Entity::find().count(db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_course_takes_reviews_not_students() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let course = graph.insert(Course::new("Pacman - How to score one million points"));
        let review = graph.insert(Review::new("Great course ... loved it!"));
        let student = graph.insert(Student::new("John", "Doe", "john@luv2code.com"));
        graph.add_review(course, review);
        graph.add_student(course, student);
        save_graph(&factory, &mut graph, course).await.unwrap();

        let mut session = factory.open_session().await.unwrap();
        session.delete(&mut graph, course).await.unwrap();
        session.commit().await.unwrap();

        assert_eq!(graph.id_of(review), None);
        assert!(graph.id_of(student).is_some());
        assert!(graph[student].courses.queued_or_fetched().is_empty());
        let db = factory.connection();
        assert_eq!(course::Entity::find().count(db).await.unwrap(), 0);
        assert_eq!(review::Entity::find().count(db).await.unwrap(), 0);
        assert_eq!(course_student::Entity::find().count(db).await.unwrap(), 0);
        assert_eq!(student::Entity::find().count(db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_student_keeps_courses() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let course = graph.insert(Course::new("Atari 2600 - Game Development"));
        let student = graph.insert(Student::new("Mary", "Public", "mary@luv2code.com"));
        graph.add_student(course, student);
        save_graph(&factory, &mut graph, course).await.unwrap();

        let mut session = factory.open_session().await.unwrap();
        session.delete(&mut graph, student).await.unwrap();
        session.commit().await.unwrap();

        assert!(graph[course].students.queued_or_fetched().is_empty());
        let db = factory.connection();
        assert_eq!(course::Entity::find().count(db).await.unwrap(), 1);
        assert_eq!(course_student::Entity::find().count(db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_unsaved_or_missing() {
        let factory = testing::setup().await;
        let mut graph = EntityGraph::new();
        let student = graph.insert(Student::new("Daffy", "Duck", "daffy@luv2code.com"));

        let mut session = factory.open_session().await.unwrap();
        let result = session.delete(&mut graph, student).await;
        assert!(matches!(result, Err(PersistenceError::Unsaved { entity: "Student" })));

        graph.assign_id(student, Some(uuid::Uuid::new_v4()));
        let result = session.delete(&mut graph, student).await;
        assert!(matches!(result, Err(PersistenceError::NotFound { entity: "Student", .. })));
    }
}
