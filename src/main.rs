// Tithe Ledger - command line operator tool
// Runs every command as the local admin against the configured database

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tithe_ledger::{
    load_contribution_rows, load_family_rows, logging, AggregateReportData, Category, Config,
    FamilyUpdate, NumericPolicy, Session, Tithe, TithePatch, TitheService, UserRole, Vawngtu,
};
use tithe_ledger::entities::tithe::MONTH_NAMES;

#[derive(Parser)]
#[command(name = "tithe-ledger", version, about = "Upa Bial tithe ledger")]
struct Cli {
    /// JSON config file
    #[arg(long, env = "TITHE_LEDGER_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database path (overrides config and TITHE_LEDGER_DB)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Log filter, e.g. tithe_ledger=debug
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,

    /// permissive | strict
    #[arg(long, value_name = "POLICY")]
    numeric_policy: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create the database and optionally seed the year's Upa Bial list
    Init {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_delimiter = ',')]
        bials: Vec<String>,
    },
    /// Show or replace the Upa Bial list of a year
    Bials {
        #[arg(long)]
        year: Option<i32>,
        /// Replace the list with these names (comma separated)
        #[arg(long, value_delimiter = ',')]
        set: Option<Vec<String>>,
    },
    /// List a unit roster with one month of tithes
    Families {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        bial: String,
    },
    /// List families that belong to no unit
    Unassigned,
    AddFamily {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        bial: String,
        #[arg(long)]
        name: String,
    },
    EditFamily {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        family_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        serial: Option<i64>,
        #[arg(long)]
        clear_serial: bool,
    },
    /// Grow a roster from a CSV with name and ip_serial_no columns
    ImportFamilies {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        bial: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Write one month of tithes from a CSV sheet
    ImportContributions {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        bial: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Set one category (with --category/--value) or the whole month
    SetTithe {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        bial: String,
        #[arg(long)]
        family_id: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        value: Option<f64>,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        pathian_ram: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        ramthar: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        tualchhung: f64,
    },
    Transfer {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        family_id: String,
        #[arg(long)]
        to: String,
    },
    Unassign {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        family_id: String,
    },
    /// Delete families and all of their logs
    Remove {
        #[arg(long)]
        year: Option<i32>,
        #[arg(required = true)]
        family_ids: Vec<String>,
    },
    /// Show or change the archive flag of a year
    Archive {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        set: Option<bool>,
    },
    /// Replace the overseers of a unit ("Name:phone" entries)
    Vawngtu {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        bial: String,
        #[arg(long, value_delimiter = ',')]
        set: Option<Vec<String>>,
    },
    /// Create or update a user role
    User {
        #[arg(long)]
        uid: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long)]
        admin: bool,
        #[arg(long)]
        bial: Option<String>,
    },
    /// Audit trail of one entity
    Events {
        #[arg(long)]
        entity_type: String,
        #[arg(long)]
        entity_id: String,
    },
    #[command(subcommand)]
    Report(ReportCmd),
}

#[derive(Subcommand)]
enum ReportCmd {
    Monthly {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: u32,
    },
    Yearly {
        #[arg(long)]
        year: Option<i32>,
    },
    Family {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        family_id: String,
    },
    Bial {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        bial: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(filter) = cli.log {
        config.log_filter = filter;
    }
    if let Some(policy) = cli.numeric_policy.as_deref() {
        config.numeric_policy =
            NumericPolicy::parse(policy).ok_or_else(|| anyhow!("unknown numeric policy {:?}", policy))?;
    }

    logging::init(&config.log_filter, config.log_json);

    let mut service = TitheService::open(&config)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    let session = Session::local_admin();

    run(&mut service, &session, cli.cmd)
}

fn run(svc: &mut TitheService, session: &Session, cmd: Cmd) -> Result<()> {
    let this_year = svc.current_year();

    match cmd {
        Cmd::Init { year, bials } => {
            let year = year.unwrap_or(this_year);
            println!("🗄️  Database ready");
            if !bials.is_empty() {
                let stored = svc.update_upa_bials_list(session, year, &bials)?;
                println!("✓ {} Upa Bial(s) for {}: {}", stored.len(), year, stored.join(", "));
            }
        }

        Cmd::Bials { year, set } => {
            let year = year.unwrap_or(this_year);
            let names = match set {
                Some(names) => svc.update_upa_bials_list(session, year, &names)?,
                None => svc.fetch_upa_bials(session, year)?,
            };
            println!("🏘️  Upa Bial list {}", year);
            for (i, name) in names.iter().enumerate() {
                let in_use = svc.is_bial_in_use(session, year, name)?;
                println!("  {:>2}. {}{}", i + 1, name, if in_use { "" } else { "  (unused)" });
            }
        }

        Cmd::Families { year, month, bial } => {
            let year = year.unwrap_or(this_year);
            let rows = svc.fetch_families(session, year, month, &bial)?;
            println!("👪 {} - {} {}", bial, month_name(month), year);
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            for row in &rows {
                println!(
                    "  {:>5}  {:<28} {:>10.2} {:>10.2} {:>10.2} {:>11.2}  {}",
                    row.family.ip_serial_no.map(|s| s.to_string()).unwrap_or_default(),
                    row.family.name,
                    row.tithe.pathian_ram,
                    row.tithe.ramthar,
                    row.tithe.tualchhung,
                    row.total,
                    row.family.id,
                );
            }
            println!("✓ {} families", rows.len());
        }

        Cmd::Unassigned => {
            let families = svc.fetch_unassigned_families(session)?;
            for family in &families {
                println!("  {:<28} {}", family.name, family.id);
            }
            println!("✓ {} unassigned families", families.len());
        }

        Cmd::AddFamily { year, bial, name } => {
            let family = svc.add_family(session, year.unwrap_or(this_year), &bial, &name)?;
            println!("✓ Added {} to {} ({})", family.name, bial, family.id);
        }

        Cmd::EditFamily { year, family_id, name, serial, clear_serial } => {
            let update = FamilyUpdate { name, ip_serial_no: serial, clear_serial };
            let family = svc.update_family_details(session, year.unwrap_or(this_year), &family_id, &update)?;
            println!("✓ Updated {} (serial: {:?})", family.name, family.ip_serial_no);
        }

        Cmd::ImportFamilies { year, bial, file } => {
            let rows = load_family_rows(&file).with_context(|| format!("reading {}", file.display()))?;
            println!("📂 Loaded {} rows from {}", rows.len(), file.display());
            let report = svc.import_families(session, year.unwrap_or(this_year), &bial, rows)?;
            println!(
                "✓ {} added, {} skipped, {} reactivated",
                report.added, report.skipped, report.reactivated
            );
        }

        Cmd::ImportContributions { year, month, bial, file } => {
            let rows = load_contribution_rows(&file).with_context(|| format!("reading {}", file.display()))?;
            println!("📂 Loaded {} rows from {}", rows.len(), file.display());
            let report = svc.import_contributions(session, year.unwrap_or(this_year), month, &bial, rows)?;
            println!("✓ {}", report.summary());
            for skipped in &report.skipped_info {
                println!("  ⚠️  row {:>3}  {:<28} {}", skipped.row, skipped.name, skipped.reason);
            }
        }

        Cmd::SetTithe {
            year,
            month,
            bial,
            family_id,
            category,
            value,
            pathian_ram,
            ramthar,
            tualchhung,
        } => {
            let patch = match category {
                Some(name) => {
                    let category = Category::parse(&name).ok_or_else(|| anyhow!("unknown category {:?}", name))?;
                    let value = value.ok_or_else(|| anyhow!("--value is required with --category"))?;
                    TithePatch::category(category, value)
                }
                None => TithePatch::FullReplace(Tithe::new(pathian_ram, ramthar, tualchhung)),
            };
            let log = svc.update_tithe(session, year.unwrap_or(this_year), month, &bial, &family_id, &patch)?;
            println!(
                "✓ {} {}: {:.2} / {:.2} / {:.2} = {:.2} ({})",
                month_name(log.month),
                log.year,
                log.tithe.pathian_ram,
                log.tithe.ramthar,
                log.tithe.tualchhung,
                log.total(),
                log.upa_bial,
            );
        }

        Cmd::Transfer { year, family_id, to } => {
            let outcome = svc.transfer_family(session, &family_id, &to, year.unwrap_or(this_year))?;
            println!(
                "✓ {} moved from {} to {} ({} logs re-attributed)",
                outcome.family.name,
                outcome.from_bial.as_deref().unwrap_or("(none)"),
                to,
                outcome.logs_moved
            );
        }

        Cmd::Unassign { year, family_id } => {
            let family = svc.unassign_family_from_bial(session, &family_id, year.unwrap_or(this_year))?;
            println!("✓ {} is now unassigned", family.name);
        }

        Cmd::Remove { year, family_ids } => {
            let outcome = svc.bulk_remove_families(session, &family_ids, year.unwrap_or(this_year))?;
            println!("✓ {} removed, {} not found", outcome.removed.len(), outcome.skipped.len());
        }

        Cmd::Archive { year, set } => {
            if let Some(archived) = set {
                svc.update_archive_status(session, year, archived)?;
            }
            let archived = svc.fetch_archive_status(session, year)?;
            println!("🔒 {} archived: {}", year, archived);
        }

        Cmd::Vawngtu { year, bial, set } => {
            let year = year.unwrap_or(this_year);
            let info = match set {
                Some(entries) => svc.update_bial_info(session, year, &bial, entries.iter().map(|e| parse_vawngtu(e)).collect())?,
                None => svc.fetch_bial_info(session, year, &bial)?,
            };
            println!("🏘️  {} overseers {}", info.bial, info.year);
            for v in &info.vawngtu {
                println!("  {:<28} {}", v.name, v.phone);
            }
        }

        Cmd::User { uid, email, admin, bial } => {
            let role = match (admin, bial) {
                (true, None) => UserRole::admin(&uid, &email),
                (true, Some(_)) => return Err(anyhow!("an admin cannot have an assigned Upa Bial")),
                (false, Some(bial)) => UserRole::member(&uid, &email, &bial),
                (false, None) => return Err(anyhow!("--bial is required for a non-admin user")),
            };
            svc.upsert_user_role(session, &role)?;
            println!("✓ Saved user {}", role.uid);
        }

        Cmd::Events { entity_type, entity_id } => {
            let events = svc.events_for_entity(session, &entity_type, &entity_id)?;
            for event in &events {
                println!(
                    "  {}  {:<24} {:<12} {}",
                    event.timestamp.to_rfc3339(),
                    event.event_type,
                    event.actor,
                    event.data
                );
            }
            println!("✓ {} events", events.len());
        }

        Cmd::Report(report) => run_report(svc, session, report, this_year)?,
    }

    Ok(())
}

fn run_report(svc: &TitheService, session: &Session, cmd: ReportCmd, this_year: i32) -> Result<()> {
    match cmd {
        ReportCmd::Monthly { year, month } => {
            let year = year.unwrap_or(this_year);
            let report = svc.fetch_monthly_report(session, year, month)?;
            println!("📊 Monthly report - {} {}", month_name(month), year);
            print_aggregate(&report);
        }

        ReportCmd::Yearly { year } => {
            let year = year.unwrap_or(this_year);
            let report = svc.fetch_yearly_report(session, year)?;
            println!("📊 Yearly report - {}", year);
            print_aggregate(&report);
        }

        ReportCmd::Family { year, family_id } => {
            let data = svc.fetch_family_yearly_data(session, year.unwrap_or(this_year), &family_id)?;
            println!(
                "📊 {} - {}",
                data.family_name.as_deref().unwrap_or("(unknown family)"),
                data.year
            );
            for month in &data.months {
                println!("  {:<10} {:>11.2}", month_name(month.month), month.total);
            }
            println!("  {:<10} {:>11.2}", "Total", data.total);
        }

        ReportCmd::Bial { year, bial } => {
            let year = year.unwrap_or(this_year);
            let totals = svc.fetch_bial_yearly_family_data(session, year, &bial)?;
            println!("📊 {} - {}", bial, year);
            for row in &totals {
                let marker = if row.in_roster { "" } else { "  (moved out)" };
                println!("  {:<28} {:>11.2}{}", row.name, row.total, marker);
            }
            let sum: f64 = totals.iter().map(|t| t.total).sum();
            println!("  {:<28} {:>11.2}", "Total", sum);
        }
    }

    Ok(())
}

fn print_aggregate(report: &AggregateReportData) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "  {:<20} {:>11} {:>11} {:>11} {:>12} {:>8}",
        "Upa Bial", "Pathian Ram", "Ramthar", "Tualchhung", "Total", "Families"
    );
    for bial in &report.bials {
        println!(
            "  {:<20} {:>11.2} {:>11.2} {:>11.2} {:>12.2} {:>8}",
            bial.upa_bial, bial.tithe.pathian_ram, bial.tithe.ramthar, bial.tithe.tualchhung, bial.total, bial.families
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "  {:<20} {:>11.2} {:>11.2} {:>11.2} {:>12.2}",
        "Grand total",
        report.grand_total.pathian_ram,
        report.grand_total.ramthar,
        report.grand_total.tualchhung,
        report.total
    );
}

fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| MONTH_NAMES.get(i as usize))
        .copied()
        .unwrap_or("?")
}

/// "Name:phone" or just "Name"
fn parse_vawngtu(entry: &str) -> Vawngtu {
    match entry.split_once(':') {
        Some((name, phone)) => Vawngtu { name: name.to_string(), phone: phone.to_string() },
        None => Vawngtu { name: entry.to_string(), phone: String::new() },
    }
}
