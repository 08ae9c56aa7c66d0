//! Prints a bearer token for local testing.
//!
//! Usage: `dev_token <user|company> <uuid> [hours]`, signed with JWT_SECRET.

use hireline::auth::create_jwt;
use hireline::conversation::{Participant, ParticipantRole};
use uuid::Uuid;

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let usage = "usage: dev_token <user|company> <uuid> [hours]";
    let role: ParticipantRole = args
        .next()
        .ok_or_else(|| anyhow::anyhow!(usage))?
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let id = Uuid::parse_str(&args.next().ok_or_else(|| anyhow::anyhow!(usage))?)?;
    let hours: i64 = match args.next() {
        Some(raw) => raw.parse()?,
        None => 24,
    };

    let secret = std::env::var("JWT_SECRET").map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;
    let token = create_jwt(Participant { id, role }, &secret, hours)?;
    println!("{}", token);
    Ok(())
}
