//! External client configuration CRUD.

use chrono::Utc;
use medley_core::{ClientId, ClientSettings, ClientType, Error, Result, UserId};
use rusqlite::Connection;

use crate::models::Client;

const COLS: &str = "id, user_id, client_type, name, settings, enabled, created_at, updated_at";

fn map_write_err(name: &str, e: rusqlite::Error) -> Error {
    if e.to_string().contains("UNIQUE constraint failed") {
        Error::Conflict(format!("A client named '{name}' already exists"))
    } else {
        Error::database(e.to_string())
    }
}

fn settings_json(settings: &ClientSettings) -> Result<String> {
    serde_json::to_string(settings).map_err(|e| Error::Internal(e.to_string()))
}

/// Create a client for `user_id`.
pub fn create_client(
    conn: &Connection,
    user_id: UserId,
    client_type: ClientType,
    name: &str,
    settings: &ClientSettings,
) -> Result<Client> {
    let id = ClientId::new();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO clients (id, user_id, client_type, name, settings, enabled, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
        rusqlite::params![
            id.to_string(),
            user_id.to_string(),
            client_type.as_str(),
            name,
            settings_json(settings)?,
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| map_write_err(name, e))?;

    Ok(Client {
        id,
        user_id,
        client_type,
        name: name.to_string(),
        settings: settings.clone(),
        enabled: true,
        created_at: now,
        updated_at: now,
    })
}

/// Get a client by id regardless of owner.
pub fn get_client(conn: &Connection, id: ClientId) -> Result<Option<Client>> {
    let q = format!("SELECT {COLS} FROM clients WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], Client::from_row) {
        Ok(c) => Ok(Some(c)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get a client only if it belongs to `user_id`.
pub fn get_user_client(conn: &Connection, user_id: UserId, id: ClientId) -> Result<Option<Client>> {
    Ok(get_client(conn, id)?.filter(|c| c.user_id == user_id))
}

/// List a user's clients by name.
pub fn list_clients(conn: &Connection, user_id: UserId, enabled_only: bool) -> Result<Vec<Client>> {
    let filter = if enabled_only { " AND enabled = 1" } else { "" };
    let q = format!("SELECT {COLS} FROM clients WHERE user_id = ?1{filter} ORDER BY name ASC");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([user_id.to_string()], Client::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Persist name, settings and enabled flag of `client`.
pub fn update_client(conn: &Connection, client: &Client) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE clients SET name = ?1, settings = ?2, enabled = ?3, updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![
                client.name,
                settings_json(&client.settings)?,
                client.enabled as i32,
                Utc::now().to_rfc3339(),
                client.id.to_string(),
            ],
        )
        .map_err(|e| map_write_err(&client.name, e))?;
    Ok(n > 0)
}

/// Delete a client. Returns true if a row was deleted.
pub fn delete_client(conn: &Connection, id: ClientId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM clients WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::users;

    fn settings() -> ClientSettings {
        ClientSettings {
            base_url: "http://jf.local".into(),
            api_key: Some("secret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn create_get_list() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = users::create_user(&conn, "u", "h", "user").unwrap();

        let c = create_client(&conn, user.id, ClientType::Jellyfin, "Living room", &settings())
            .unwrap();
        let found = get_client(&conn, c.id).unwrap().unwrap();
        assert_eq!(found.client_type, ClientType::Jellyfin);
        assert_eq!(found.settings.api_key.as_deref(), Some("secret"));
        assert!(found.enabled);

        assert_eq!(list_clients(&conn, user.id, false).unwrap().len(), 1);
        let other = users::create_user(&conn, "o", "h", "user").unwrap();
        assert!(get_user_client(&conn, other.id, c.id).unwrap().is_none());
        assert!(list_clients(&conn, other.id, false).unwrap().is_empty());
    }

    #[test]
    fn duplicate_name_conflicts() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = users::create_user(&conn, "u", "h", "user").unwrap();
        create_client(&conn, user.id, ClientType::Plex, "Home", &settings()).unwrap();
        let err = create_client(&conn, user.id, ClientType::Emby, "Home", &settings()).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn update_disable_and_delete() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = users::create_user(&conn, "u", "h", "user").unwrap();
        let mut c = create_client(&conn, user.id, ClientType::Plex, "Home", &settings()).unwrap();

        c.enabled = false;
        c.name = "Cabin".into();
        assert!(update_client(&conn, &c).unwrap());
        assert!(list_clients(&conn, user.id, true).unwrap().is_empty());
        assert_eq!(get_client(&conn, c.id).unwrap().unwrap().name, "Cabin");

        assert!(delete_client(&conn, c.id).unwrap());
        assert!(get_client(&conn, c.id).unwrap().is_none());
    }
}
