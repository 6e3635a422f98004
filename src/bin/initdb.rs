//! Wipes the database and loads the starting departments and employees.

use clap::Parser;
use quizboard::{
    config::{build_pool, init_tracing},
    initdb::{SEED, reset_database},
};

#[derive(Parser)]
#[command(about = "Reset the quizboard database to its seed data")]
struct InitDb {
    #[arg(long, env = "DATABASE_URL", default_value = "quizboard.db")]
    database_url: String,
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let args = InitDb::parse();

    init_tracing(&args.log_level)?;

    let pool = build_pool(&args.database_url)?;
    let mut conn = pool.get()?;
    reset_database(&mut conn)?;

    for (department, members) in SEED {
        println!("{department}");
        for (name, access_code, _) in *members {
            println!("  {name}: {access_code}");
        }
    }

    Ok(())
}
