//! Database query functions for the `animals` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{Animal, AnimalSex, Species};

/// Parameters for inserting a new animal row.
#[derive(Debug, Clone)]
pub struct NewAnimal {
    pub tenant_id: Uuid,
    pub name: String,
    pub species: Species,
    pub sex: AnimalSex,
}

pub async fn insert_animal<'e, E: PgExecutor<'e>>(executor: E, new: &NewAnimal) -> Result<Animal> {
    let animal = sqlx::query_as::<_, Animal>(
        "INSERT INTO animals (tenant_id, name, species, sex) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(new.tenant_id)
    .bind(&new.name)
    .bind(new.species)
    .bind(new.sex)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert animal {:?}", new.name))?;

    Ok(animal)
}

pub async fn get_animal<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<Animal>> {
    let animal =
        sqlx::query_as::<_, Animal>("SELECT * FROM animals WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(executor)
            .await
            .with_context(|| format!("failed to fetch animal {id}"))?;

    Ok(animal)
}

/// List a tenant's animals by name.
pub async fn list_animals<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
) -> Result<Vec<Animal>> {
    let animals =
        sqlx::query_as::<_, Animal>("SELECT * FROM animals WHERE tenant_id = $1 ORDER BY name")
            .bind(tenant_id)
            .fetch_all(executor)
            .await
            .context("failed to list animals")?;

    Ok(animals)
}

/// Recompute `in_active_breeding_plan` for one animal from the plans that
/// reference it as dam, sire or recipient.
///
/// `active_statuses` lists the status strings that count as actively
/// breeding. Archived and deleted plans never count. Idempotent; returns
/// the new flag value, or `None` when the animal does not exist for this
/// tenant.
pub async fn sync_breeding_flag<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    animal_id: Uuid,
    active_statuses: &[&str],
) -> Result<Option<bool>> {
    let statuses: Vec<String> = active_statuses.iter().map(|s| (*s).to_owned()).collect();
    let flag: Option<(bool,)> = sqlx::query_as(
        "UPDATE animals a \
         SET in_active_breeding_plan = EXISTS ( \
             SELECT 1 FROM breeding_plans p \
             WHERE p.tenant_id = a.tenant_id \
               AND (p.dam_id = a.id OR p.sire_id = a.id OR p.recipient_id = a.id) \
               AND p.deleted_at IS NULL \
               AND p.archived = FALSE \
               AND p.status = ANY($3) \
         ) \
         WHERE a.id = $1 AND a.tenant_id = $2 \
         RETURNING a.in_active_breeding_plan",
    )
    .bind(animal_id)
    .bind(tenant_id)
    .bind(&statuses)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to sync breeding flag for animal {animal_id}"))?;

    Ok(flag.map(|(f,)| f))
}
