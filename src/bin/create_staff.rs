use std::env;

use diesel::prelude::*;

use anyhow::Context;

use registrar::auth::password;
use registrar::db;
use registrar::models::NewStaff;
use registrar::schema::{roles, staff};

/// Inserts a staff principal with a freshly hashed password. Usage:
///
///   create_staff <id> <firstname> <lastname> <email> <role> <password>
fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let [id, firstname, lastname, email, role, plaintext]: [String; 6] = args
        .try_into()
        .map_err(|_| anyhow::anyhow!("usage: create_staff <id> <firstname> <lastname> <email> <role> <password>"))?;

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = db::init_pool(&database_url, 1)?;
    let mut conn = pool.get()?;

    let role_id: i32 = roles::table
        .filter(roles::name.eq(&role))
        .select(roles::id)
        .first(&mut conn)
        .map_err(|_| anyhow::anyhow!("unknown role '{role}'"))?;

    let password_hash = password::hash_password(&plaintext)?;

    diesel::insert_into(staff::table)
        .values(&NewStaff {
            id: id.clone(),
            firstname,
            lastname,
            email,
            password_hash,
            role_id,
        })
        .execute(&mut conn)?;

    println!("created staff principal {id}");
    Ok(())
}
