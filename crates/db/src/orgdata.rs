use chrono::Utc;
use sqlx::Row;

use crewflow_core::orgchart::{InMemoryOrgDirectory, OrgMember};

use crate::repositories::RepositoryError;
use crate::DbPool;

/// Load the full org hierarchy into an in-memory directory snapshot.
///
/// Approver resolution is synchronous and hot, so the server materializes
/// the chart once at startup (and again whenever the hierarchy is reloaded)
/// instead of querying per request.
pub async fn load_org_directory(pool: &DbPool) -> Result<InMemoryOrgDirectory, RepositoryError> {
    let rows = sqlx::query(
        "SELECT user_id, manager_id, team, is_admin FROM org_hierarchy ORDER BY user_id ASC",
    )
    .fetch_all(pool)
    .await?;

    let members = rows
        .into_iter()
        .map(|row| {
            Ok(OrgMember {
                user_id: row.try_get("user_id")?,
                manager_id: row.try_get("manager_id")?,
                team: row.try_get("team")?,
                admin: row.try_get("is_admin")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(InMemoryOrgDirectory::new(members))
}

pub async fn upsert_member(pool: &DbPool, member: &OrgMember) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO org_hierarchy (user_id, manager_id, team, is_admin, updated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
            manager_id = excluded.manager_id,
            team = excluded.team,
            is_admin = excluded.is_admin,
            updated_at = excluded.updated_at",
    )
    .bind(&member.user_id)
    .bind(member.manager_id.as_deref())
    .bind(&member.team)
    .bind(member.admin)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crewflow_core::config::DatabaseConfig;
    use crewflow_core::orgchart::{OrgDirectory, OrgMember};

    use super::{load_org_directory, upsert_member};
    use crate::{connect, migrations};

    #[tokio::test]
    async fn directory_snapshot_reflects_the_stored_hierarchy() {
        let database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 30,
        };
        let pool = connect(&database).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let members = [
            OrgMember {
                user_id: "u-emp".to_string(),
                manager_id: Some("u-lead".to_string()),
                team: "ops".to_string(),
                admin: false,
            },
            OrgMember {
                user_id: "u-lead".to_string(),
                manager_id: Some("u-head".to_string()),
                team: "ops".to_string(),
                admin: false,
            },
            OrgMember {
                user_id: "u-head".to_string(),
                manager_id: None,
                team: "hq".to_string(),
                admin: true,
            },
        ];
        for member in &members {
            upsert_member(&pool, member).await.expect("upsert");
        }

        let directory = load_org_directory(&pool).await.expect("load");
        assert_eq!(directory.manager_of("u-emp"), Some("u-lead".to_string()));
        assert_eq!(directory.approver_for("u-emp", 1), Some("u-head".to_string()));
        assert!(directory.is_admin("u-head"));

        // Upsert replaces in place.
        upsert_member(
            &pool,
            &OrgMember {
                user_id: "u-emp".to_string(),
                manager_id: Some("u-head".to_string()),
                team: "ops".to_string(),
                admin: false,
            },
        )
        .await
        .expect("re-upsert");

        let directory = load_org_directory(&pool).await.expect("reload");
        assert_eq!(directory.manager_of("u-emp"), Some("u-head".to_string()));
    }
}
