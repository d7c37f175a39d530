use crate::identity::{AccountSummary, Role};

pub fn banner() -> String {
    let mut s = String::new();
    s.push_str("╔═══════════════════════════════════════════════════════════╗\n");
    s.push_str("║             P H A N T O M   C O N S O L E                 ║\n");
    s.push_str("╚═══════════════════════════════════════════════════════════╝\n");
    s
}

/// Shown whenever dev credentials are active so nobody mistakes the build for production.
pub fn dev_warning(username: &str, password: &str) -> String {
    let rows = [
        "  !  DEVELOPMENT MODE IS ENABLED".to_string(),
        format!("  Username: {}", username),
        format!("  Password: {}", password),
    ];
    boxed(None, &rows)
}

pub fn section(title: &str, lines: &[String]) -> String { boxed(Some(title), lines) }

/// Top-level help; account administration lines only for root.
pub fn help(role: Option<Role>) -> String {
    let mut entries: Vec<(&str, &str)> = vec![
        ("help", "Show this help message"),
        ("clear | cls", "Clear the screen"),
        ("info", "Show version information"),
        ("user list", "List all accounts"),
    ];
    if role == Some(Role::Root) {
        entries.extend([
            ("user create", "Create a new account"),
            ("user delete <name>", "Delete an account"),
            ("user update <name>", "Change name, password or role"),
            ("user upgrade <name>", "Promote an account to root"),
        ]);
    }
    entries.extend([("logout", "Log out current user"), ("exit | quit", "Exit Phantom Console")]);
    let width = entries.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
    let lines: Vec<String> = entries.iter().map(|(c, d)| format!("{:width$} - {}", c, d, width = width)).collect();
    let mut s = boxed(Some("Available Commands"), &lines);
    s.push_str("Tips:\n");
    s.push_str("- Use Up/Down arrows for command history, Tab to complete commands\n");
    s.push_str("- Type 'help' to see this message again\n");
    s
}

pub fn user_help() -> String {
    let lines = [
        "user create          - Create a new account",
        "user delete <name>   - Delete an account",
        "user list            - List all accounts",
        "user update <name>   - Update account details",
        "user upgrade <name>  - Upgrade an account to root",
    ]
    .map(String::from);
    boxed(Some("User Management"), &lines)
}

pub fn password_requirements(reqs: &[String]) -> String {
    let mut s = String::from("Password Requirements:\n");
    for r in reqs { s.push_str("- "); s.push_str(r); s.push('\n'); }
    s
}

pub fn update_menu() -> String {
    let lines = ["1. Update Username", "2. Update Password", "3. Update Role", "4. Exit"].map(String::from);
    boxed(Some("Update User"), &lines)
}

pub fn role_menu() -> String { "Select role:\n1. Admin\n2. User\n".to_string() }

pub fn info(version: &str) -> String {
    let lines = [format!("Version: {}", version), format!("Package: {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))];
    boxed(Some("About Phantom Console"), &lines)
}

// Render accounts as an ASCII table, root first.
pub fn account_table(accounts: &[AccountSummary]) -> String {
    let cols = vec!["name".to_string(), "role".to_string()];
    let rows: Vec<Vec<String>> = accounts.iter().map(|a| vec![a.name.clone(), a.role.to_string()]).collect();
    let mut widths: Vec<usize> = cols.iter().map(|c| display_len(c)).collect();
    for r in &rows {
        for (i, cell) in r.iter().enumerate() {
            widths[i] = widths[i].max(display_len(cell));
        }
    }
    let sep = build_separator(&widths);
    let mut out = String::new();
    out.push_str(&sep); out.push('\n');
    out.push_str(&build_row(&cols, &widths)); out.push('\n');
    out.push_str(&sep); out.push('\n');
    for r in &rows { out.push_str(&build_row(r, &widths)); out.push('\n'); }
    out.push_str(&sep); out.push('\n');
    out.push_str(&format!("accounts: {}\n", rows.len()));
    out
}

fn boxed(title: Option<&str>, lines: &[String]) -> String {
    let inner = lines.iter().map(|l| display_len(l)).chain(title.map(|t| display_len(t) + 3)).max().unwrap_or(0) + 2;
    let mut s = String::new();
    match title {
        Some(t) => {
            let head = format!("┌─ {} ", t);
            let fill = (inner + 2).saturating_sub(display_len(&head)).saturating_sub(1);
            s.push_str(&head);
            s.push_str(&"─".repeat(fill));
            s.push_str("┐\n");
        }
        None => { s.push('┌'); s.push_str(&"─".repeat(inner)); s.push_str("┐\n"); }
    }
    for l in lines {
        s.push_str("│ ");
        s.push_str(l);
        s.push_str(&" ".repeat(inner - 1 - display_len(l)));
        s.push_str("│\n");
    }
    s.push('└');
    s.push_str(&"─".repeat(inner));
    s.push_str("┘\n");
    s
}

fn display_len(s: &str) -> usize { s.chars().count() }

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('+');
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('|');
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).cloned().unwrap_or_default();
        s.push(' ');
        s.push_str(&cell);
        s.push_str(&" ".repeat(w.saturating_sub(display_len(&cell))));
        s.push_str(" |");
    }
    s
}
