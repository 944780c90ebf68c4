use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "instructors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub instructor_detail_id: Option<Uuid>, // Owning side of the one-to-one link
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::instructor_detail::Entity",
        from = "Column::InstructorDetailId",
        to = "super::instructor_detail::Column::Id"
    )]
    InstructorDetail,
    #[sea_orm(has_many = "super::course::Entity")]
    Courses,
}

impl Related<super::instructor_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InstructorDetail.def()
    }
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Courses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
