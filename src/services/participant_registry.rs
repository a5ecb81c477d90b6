// ==================== PARTICIPANT REGISTRY ====================
// Resolves Person identity (find-or-create by email, merge-update on every
// later encounter) and reconciles the primary/co-applicant participant set
// for one application. Order is the positional key: 1 = primary,
// co-applicants 2..N contiguous, matching the client array index + 2.

use crate::{
    database::MongoDB,
    models::{Participant, Person, PRIMARY_ORDER, ROLE_CO_APPLICANT, ROLE_PRIMARY},
    utils::error::AppError,
};
use futures::stream::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, utoipa::ToSchema)]
pub struct PersonFields {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nationality: Option<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Given the orders currently stored for co-applicants and the length of the
/// newly supplied list, returns the stored orders that no longer have a
/// corresponding entry and must be deleted.
pub fn stale_orders(existing: &[i32], new_len: usize) -> Vec<i32> {
    let highest_kept = new_len as i32 + 1; // co-applicant i occupies order i+2
    let mut stale: Vec<i32> = existing
        .iter()
        .copied()
        .filter(|o| *o > highest_kept)
        .collect();
    stale.sort_unstable();
    stale
}

/// Find-or-create a Person by email. An existing row is merge-updated: name
/// fields always overwrite, optional fields only when supplied. Never
/// creates a second row for the same email.
pub async fn find_or_create_person(db: &MongoDB, fields: &PersonFields) -> Result<Person, AppError> {
    let email = normalize_email(&fields.email);
    if email.is_empty() {
        return Err(AppError::ValidationError("Email is required".to_string()));
    }

    let collection = db.collection::<Person>("people");
    let now = BsonDateTime::now();

    if let Some(mut existing) = collection.find_one(doc! { "email": &email }).await? {
        let mut update = doc! {
            "first_name": &fields.first_name,
            "last_name": &fields.last_name,
            "updated_at": now,
        };
        if let Some(dob) = &fields.date_of_birth {
            update.insert("date_of_birth", dob);
        }
        if let Some(phone) = &fields.phone {
            update.insert("phone", phone);
        }
        if let Some(nationality) = &fields.nationality {
            update.insert("nationality", nationality);
        }

        collection
            .update_one(doc! { "email": &email }, doc! { "$set": update })
            .await?;

        existing.first_name = fields.first_name.clone();
        existing.last_name = fields.last_name.clone();
        if fields.date_of_birth.is_some() {
            existing.date_of_birth = fields.date_of_birth.clone();
        }
        if fields.phone.is_some() {
            existing.phone = fields.phone.clone();
        }
        if fields.nationality.is_some() {
            existing.nationality = fields.nationality.clone();
        }

        log::debug!("👤 Updated existing person {} ({})", existing.person_id, email);
        return Ok(existing);
    }

    let person = Person {
        _id: None,
        person_id: ObjectId::new().to_hex(),
        email: email.clone(),
        first_name: fields.first_name.clone(),
        last_name: fields.last_name.clone(),
        date_of_birth: fields.date_of_birth.clone(),
        phone: fields.phone.clone(),
        nationality: fields.nationality.clone(),
        created_at: Some(now),
        updated_at: Some(now),
    };

    collection.insert_one(&person).await?;

    log::info!("👤 Created person {} ({})", person.person_id, email);

    Ok(person)
}

/// Upserts the Participant row for (application_id, order). The person link
/// is re-pointed when the slot's identity changed between saves.
async fn upsert_participant(
    db: &MongoDB,
    application_id: &str,
    person_id: &str,
    role: &str,
    order: i32,
) -> Result<Participant, AppError> {
    let collection = db.collection::<Participant>("application_participants");
    let now = BsonDateTime::now();

    let filter = doc! { "application_id": application_id, "order": order };

    if let Some(mut existing) = collection.find_one(filter.clone()).await? {
        collection
            .update_one(
                filter,
                doc! { "$set": {
                    "person_id": person_id,
                    "role": role,
                    "updated_at": now,
                } },
            )
            .await?;
        existing.person_id = person_id.to_string();
        existing.role = role.to_string();
        return Ok(existing);
    }

    let participant = Participant {
        _id: None,
        participant_id: ObjectId::new().to_hex(),
        application_id: application_id.to_string(),
        person_id: person_id.to_string(),
        role: role.to_string(),
        order,
        address_line1: None,
        address_line2: None,
        city: None,
        postal_code: None,
        country: None,
        homeowner_status: None,
        employment_status: None,
        tax_country: None,
        other_assets: None,
        created_at: Some(now),
        updated_at: Some(now),
    };

    collection.insert_one(&participant).await?;

    log::info!(
        "🧩 Created {} participant {} for application {} (order {})",
        role,
        participant.participant_id,
        application_id,
        order
    );

    Ok(participant)
}

/// Find-or-create the Person and upsert the primary Participant (order 1)
/// for the application. Idempotent: a second call with the same email
/// updates the same rows.
pub async fn ensure_primary(
    db: &MongoDB,
    application_id: &str,
    fields: &PersonFields,
) -> Result<Participant, AppError> {
    let person = find_or_create_person(db, fields).await?;
    upsert_participant(db, application_id, &person.person_id, ROLE_PRIMARY, PRIMARY_ORDER).await
}

/// Reconciles the stored co-applicant set against the supplied list: each
/// entry is upserted at order index+2, and stored co-applicants whose order
/// has no corresponding entry are deleted (removals and full clearing).
pub async fn reconcile_co_applicants(
    db: &MongoDB,
    application_id: &str,
    co_applicants: &[PersonFields],
) -> Result<Vec<Participant>, AppError> {
    let mut result = Vec::with_capacity(co_applicants.len());

    for (index, fields) in co_applicants.iter().enumerate() {
        let person = find_or_create_person(db, fields).await?;
        let order = index as i32 + 2;
        let participant =
            upsert_participant(db, application_id, &person.person_id, ROLE_CO_APPLICANT, order)
                .await?;
        result.push(participant);
    }

    // Delete stored co-applicants whose order has no entry in the new list
    let collection = db.collection::<Participant>("application_participants");
    let existing_orders: Vec<i32> = collection
        .distinct(
            "order",
            doc! { "application_id": application_id, "role": ROLE_CO_APPLICANT },
        )
        .await?
        .into_iter()
        .filter_map(|b| b.as_i32())
        .collect();

    let stale = stale_orders(&existing_orders, co_applicants.len());
    if !stale.is_empty() {
        let stale_bson: Vec<Bson> = stale.iter().map(|o| Bson::Int32(*o)).collect();
        let deleted = collection
            .delete_many(doc! {
                "application_id": application_id,
                "role": ROLE_CO_APPLICANT,
                "order": { "$in": stale_bson },
            })
            .await?;
        log::info!(
            "🗑️  Removed {} stale co-applicant(s) from application {}",
            deleted.deleted_count,
            application_id
        );
    }

    Ok(result)
}

/// Looks up one participant slot by positional order.
pub async fn find_participant(
    db: &MongoDB,
    application_id: &str,
    order: i32,
) -> Result<Participant, AppError> {
    let collection = db.collection::<Participant>("application_participants");
    collection
        .find_one(doc! { "application_id": application_id, "order": order })
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No participant at order {} for application {}",
                order, application_id
            ))
        })
}

/// All participants of an application, ordered, read from durable storage.
pub async fn list_participants(
    db: &MongoDB,
    application_id: &str,
) -> Result<Vec<Participant>, AppError> {
    let collection = db.collection::<Participant>("application_participants");
    let options = mongodb::options::FindOptions::builder()
        .sort(doc! { "order": 1 })
        .build();

    let mut cursor = collection
        .find(doc! { "application_id": application_id })
        .with_options(options)
        .await?;

    // A row that fails to decode is an error, not a gap: callers like the
    // submission fan-out must never silently lose a participant.
    let mut participants = Vec::new();
    while let Some(result) = cursor.next().await {
        participants.push(result?);
    }

    Ok(participants)
}

/// Deletes one co-applicant slot directly. Callers that still hold the full
/// list should prefer reconcile_co_applicants, which also closes order gaps.
pub async fn remove_co_applicant(
    db: &MongoDB,
    application_id: &str,
    order: i32,
) -> Result<(), AppError> {
    if order <= PRIMARY_ORDER {
        return Err(AppError::ValidationError(
            "The primary participant cannot be removed".to_string(),
        ));
    }

    let collection = db.collection::<Participant>("application_participants");
    let deleted = collection
        .delete_one(doc! {
            "application_id": application_id,
            "role": ROLE_CO_APPLICANT,
            "order": order,
        })
        .await?;

    if deleted.deleted_count == 0 {
        return Err(AppError::NotFound(format!(
            "No co-applicant at order {} for application {}",
            order, application_id
        )));
    }

    // Shift the remaining co-applicants down so orders stay contiguous
    collection
        .update_many(
            doc! {
                "application_id": application_id,
                "role": ROLE_CO_APPLICANT,
                "order": { "$gt": order },
            },
            doc! { "$inc": { "order": Bson::Int32(-1) } },
        )
        .await?;

    log::info!(
        "🗑️  Removed co-applicant at order {} from application {}",
        order,
        application_id
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shrinking_list_deletes_tail_orders() {
        // 3 stored co-applicants (orders 2..4), new list of length 1
        assert_eq!(stale_orders(&[2, 3, 4], 1), vec![3, 4]);
    }

    #[test]
    fn clearing_list_deletes_everything() {
        assert_eq!(stale_orders(&[2, 3], 0), vec![2, 3]);
    }

    #[test]
    fn growing_list_deletes_nothing() {
        assert!(stale_orders(&[2, 3], 4).is_empty());
        assert!(stale_orders(&[], 2).is_empty());
    }

    #[test]
    fn email_is_normalized() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    }
}
