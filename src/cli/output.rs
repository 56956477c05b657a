//! CLI output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::auth::{Permission, UserView};
use crate::meter::Reading;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn warn(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

/// Print a table of user accounts
pub fn print_user_table(users: &[UserView]) {
    if users.is_empty() {
        info("No users configured");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Username").fg(Color::Cyan),
            Cell::new("Role").fg(Color::Cyan),
            Cell::new("Permissions").fg(Color::Cyan),
        ]);

    for user in users {
        let role_color = if user.permissions.iter().any(|p| p == Permission::ADMIN) {
            Color::Red
        } else if user.permissions.iter().any(|p| p == Permission::WRITE) {
            Color::Yellow
        } else {
            Color::Green
        };

        table.add_row(vec![
            Cell::new(&user.username),
            Cell::new(&user.role).fg(role_color),
            Cell::new(user.permissions.join(", ")),
        ]);
    }

    println!("{table}");
}

/// Print a single meter reading
pub fn print_reading(reading: &Reading) {
    println!("{}", "Meter Reading".bold().underline());
    println!();
    println!(
        "  {} {}",
        "Time:".bold(),
        reading.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  {} {:.1} V", "Voltage:".bold(), reading.voltage_v);
    println!("  {} {:.2} A", "Current:".bold(), reading.current_a);
    println!("  {} {}", "Power:".bold(), format!("{:.3} kW", reading.power_kw).cyan());
    println!("  {} {:.3} kWh", "Energy:".bold(), reading.energy_kwh);
    println!("  {} {:.2} Hz", "Frequency:".bold(), reading.frequency_hz);
    println!("  {} {:.3}", "Power factor:".bold(), reading.power_factor);

    if let Some(phases) = &reading.phases {
        println!();
        println!("  {}", "Phases:".bold());
        for phase in phases {
            println!(
                "    {} {:.1} V  {:.2} A  {:.3} kW",
                phase.phase.bold(),
                phase.voltage_v,
                phase.current_a,
                phase.power_kw
            );
        }
    }
}
