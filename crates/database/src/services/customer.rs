use crate::entities::customer;
use log::info;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, DatabaseConnection, DbErr, EntityTrait, QueryOrder,
};
use uuid::Uuid;

pub struct CustomerService;

impl CustomerService {
    /// All customers sorted by last name
    pub async fn get_customers(db: &DatabaseConnection) -> Result<Vec<customer::Model>, DbErr> {
        customer::Entity::find()
            .order_by_asc(customer::Column::LastName)
            .order_by_asc(customer::Column::FirstName)
            .all(db)
            .await
    }

    pub async fn get_customer(
        db: &DatabaseConnection,
        id: Uuid,
    ) -> Result<Option<customer::Model>, DbErr> {
        customer::Entity::find_by_id(id).one(db).await
    }

    pub async fn create_customer(
        db: &DatabaseConnection,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<customer::Model, DbErr> {
        let model = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            first_name: Set(first_name.to_owned()),
            last_name: Set(last_name.to_owned()),
            email: Set(email.to_owned()),
        };

        let created = model.insert(db).await?;
        info!("Created customer {}", created.id);
        Ok(created)
    }

    /// Overwrites a customer's fields, `None` when no such customer exists
    pub async fn update_customer(
        db: &DatabaseConnection,
        id: Uuid,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<Option<customer::Model>, DbErr> {
        let Some(existing) = Self::get_customer(db, id).await? else {
            return Ok(None);
        };

        let mut model: customer::ActiveModel = existing.into();
        model.first_name = Set(first_name.to_owned());
        model.last_name = Set(last_name.to_owned());
        model.email = Set(email.to_owned());

        let updated = model.update(db).await?;
        info!("Updated customer {id}");
        Ok(Some(updated))
    }

    /// Whether a row was deleted
    pub async fn delete_customer(db: &DatabaseConnection, id: Uuid) -> Result<bool, DbErr> {
        let result = customer::Entity::delete_by_id(id).exec(db).await?;
        if result.rows_affected > 0 {
            info!("Deleted customer {id}");
        }
        Ok(result.rows_affected > 0)
    }
}
