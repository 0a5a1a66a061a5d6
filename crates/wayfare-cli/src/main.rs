use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wayfare", about = "Wayfare trip photos and expenses CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a trip
    CreateTrip {
        name: String,
        /// Owner contact (e.g., an email address)
        #[arg(short, long)]
        owner: String,
    },
    /// Delete a trip and everything recorded for it
    DeleteTrip { trip: i64 },
    /// Upload photos to a trip and group their faces
    Upload {
        trip: i64,
        #[arg(required = true)]
        photos: Vec<PathBuf>,
    },
    /// List a trip's face groups
    Groups { trip: i64 },
    /// Name a face group
    Rename { group: i64, name: String },
    /// List the photos a face group appears in
    GroupPhotos { group: i64 },
    /// List active merge suggestions
    Suggestions { trip: i64 },
    /// Merge the two groups of a suggestion
    Merge {
        suggestion: i64,
        /// Contact of the person reviewing
        #[arg(short, long)]
        actor: String,
    },
    /// Keep the two groups of a suggestion apart
    Dismiss {
        suggestion: i64,
        #[arg(short, long)]
        actor: String,
    },
    /// Add a trip member
    AddMember {
        trip: i64,
        name: String,
        #[arg(short, long)]
        contact: Option<String>,
    },
    /// Remove a trip member
    RemoveMember { member: i64 },
    /// List trip members
    Members { trip: i64 },
    /// Record an expense
    AddExpense {
        trip: i64,
        /// Amount, e.g. 12.50
        amount: String,
        #[arg(short, long)]
        category: String,
        /// Date as YYYY-MM-DD
        #[arg(short, long)]
        date: String,
        #[arg(long)]
        description: Option<String>,
        /// Paying member id
        #[arg(short, long)]
        payer: Option<i64>,
    },
    /// List expenses
    Expenses { trip: i64 },
    /// Show balances and who pays whom
    Settle {
        trip: i64,
        /// Print the raw settlement JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.wayfare.Wayfare1",
    default_service = "org.wayfare.Wayfare1",
    default_path = "/org/wayfare/Wayfare1"
)]
trait Wayfare {
    async fn create_trip(&self, name: &str, owner: &str) -> zbus::Result<String>;
    async fn delete_trip(&self, trip_id: i64) -> zbus::Result<bool>;
    async fn upload_photos(&self, trip_id: i64, paths: Vec<String>) -> zbus::Result<String>;
    async fn face_groups(&self, trip_id: i64) -> zbus::Result<String>;
    async fn rename_group(&self, group_id: i64, name: &str) -> zbus::Result<bool>;
    async fn group_photos(&self, group_id: i64) -> zbus::Result<String>;
    async fn suggestions(&self, trip_id: i64) -> zbus::Result<String>;
    async fn merge_suggestion(&self, suggestion_id: i64, actor: &str) -> zbus::Result<String>;
    async fn dismiss_suggestion(&self, suggestion_id: i64, actor: &str) -> zbus::Result<String>;
    async fn add_member(&self, trip_id: i64, name: &str, contact: &str) -> zbus::Result<String>;
    async fn remove_member(&self, member_id: i64) -> zbus::Result<bool>;
    async fn members(&self, trip_id: i64) -> zbus::Result<String>;
    async fn add_expense(
        &self,
        trip_id: i64,
        amount: &str,
        category: &str,
        date: &str,
        description: &str,
        payer_id: i64,
    ) -> zbus::Result<String>;
    async fn expenses(&self, trip_id: i64) -> zbus::Result<String>;
    async fn settle(&self, trip_id: i64) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("cannot connect to the session bus")?;
    let proxy = WayfareProxy::new(&conn).await?;

    match cli.command {
        Commands::CreateTrip { name, owner } => {
            print_json(&proxy.create_trip(&name, &owner).await?)?
        }
        Commands::DeleteTrip { trip } => {
            if proxy.delete_trip(trip).await? {
                println!("Deleted trip {trip}");
            } else {
                println!("No trip {trip}");
            }
        }
        Commands::Upload { trip, photos } => {
            // The daemon resolves paths itself, so send them absolute.
            let paths = photos
                .iter()
                .map(|p| std::path::absolute(p).map(|p| p.to_string_lossy().into_owned()))
                .collect::<std::io::Result<Vec<_>>>()?;
            tracing::debug!(trip, photos = paths.len(), "uploading");
            print_json(&proxy.upload_photos(trip, paths).await?)?;
        }
        Commands::Groups { trip } => print_json(&proxy.face_groups(trip).await?)?,
        Commands::Rename { group, name } => {
            if proxy.rename_group(group, &name).await? {
                println!("Group {group} is now {name:?}");
            } else {
                println!("No group {group}");
            }
        }
        Commands::GroupPhotos { group } => print_json(&proxy.group_photos(group).await?)?,
        Commands::Suggestions { trip } => print_json(&proxy.suggestions(trip).await?)?,
        Commands::Merge { suggestion, actor } => {
            print_json(&proxy.merge_suggestion(suggestion, &actor).await?)?
        }
        Commands::Dismiss { suggestion, actor } => {
            print_json(&proxy.dismiss_suggestion(suggestion, &actor).await?)?
        }
        Commands::AddMember { trip, name, contact } => {
            let contact = contact.unwrap_or_default();
            print_json(&proxy.add_member(trip, &name, &contact).await?)?
        }
        Commands::RemoveMember { member } => {
            if proxy.remove_member(member).await? {
                println!("Removed member {member}");
            } else {
                println!("No member {member}");
            }
        }
        Commands::Members { trip } => print_json(&proxy.members(trip).await?)?,
        Commands::AddExpense {
            trip,
            amount,
            category,
            date,
            description,
            payer,
        } => {
            let description = description.unwrap_or_default();
            let reply = proxy
                .add_expense(trip, &amount, &category, &date, &description, payer.unwrap_or(0))
                .await?;
            print_json(&reply)?
        }
        Commands::Expenses { trip } => print_json(&proxy.expenses(trip).await?)?,
        Commands::Settle { trip, json } => {
            let reply = proxy.settle(trip).await?;
            if json {
                print_json(&reply)?;
            } else {
                let settlement: Value = serde_json::from_str(&reply)?;
                for line in settlement_lines(&settlement) {
                    println!("{line}");
                }
            }
        }
        Commands::Status => print_json(&proxy.status().await?)?,
    }

    Ok(())
}

fn print_json(raw: &str) -> Result<()> {
    let value: Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Human-readable summary of a settlement reply.
fn settlement_lines(settlement: &Value) -> Vec<String> {
    let amount = |v: &Value, key: &str| v[key].as_f64().unwrap_or(0.0);
    let mut lines = vec![format!(
        "Total {:.2}, share per member {:.2}",
        amount(settlement, "total"),
        amount(settlement, "share")
    )];

    let transfers = settlement["transactions"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    if transfers.is_empty() {
        lines.push("All settled".to_string());
    }
    for t in transfers {
        lines.push(format!(
            "{} pays {} {:.2}",
            t["from_name"].as_str().unwrap_or("?"),
            t["to_name"].as_str().unwrap_or("?"),
            amount(t, "amount")
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_settlement_lines() {
        let settlement = serde_json::json!({
            "total": 300.0,
            "share": 100.0,
            "transactions": [
                {"from": 2, "from_name": "B", "to": 1, "to_name": "A", "amount": 100.0},
                {"from": 3, "from_name": "C", "to": 1, "to_name": "A", "amount": 100.0},
            ],
        });
        assert_eq!(
            settlement_lines(&settlement),
            vec![
                "Total 300.00, share per member 100.00",
                "B pays A 100.00",
                "C pays A 100.00",
            ]
        );
    }

    #[test]
    fn test_settlement_lines_when_settled() {
        let settlement = serde_json::json!({"total": 0.0, "share": 0.0, "transactions": []});
        assert_eq!(settlement_lines(&settlement)[1], "All settled");
    }

    #[test]
    fn test_add_expense_args() {
        let cli = Cli::try_parse_from([
            "wayfare", "add-expense", "4", "12.50", "-c", "food", "-d", "2024-07-03", "-p", "9",
        ])
        .unwrap();
        match cli.command {
            Commands::AddExpense { trip, amount, payer, description, .. } => {
                assert_eq!(
                    (trip, amount.as_str(), payer, description),
                    (4, "12.50", Some(9), None)
                );
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
