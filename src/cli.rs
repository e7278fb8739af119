use crate::{
    activity::ActivityLog,
    config::Config,
    directory,
    error::AccessError,
    gate::{self, Route},
    model::{Credentials, Department},
    notify::Notifier,
    pass::{PassGenerator, PassPhase},
    roster,
    session::SessionStore,
    store::RemoteStore,
    verify, Args,
};
use anyhow::{anyhow, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Context {
    pub args: Args,
    pub config: Config,
    pub store: Box<dyn RemoteStore>,
    pub session: RefCell<SessionStore>,
    pub passes: RefCell<PassGenerator>,
    pub route: RefCell<Route>,
    pub directory: RefCell<Option<Vec<Department>>>,
    pub activity: RefCell<ActivityLog>,
    pub notifier: Arc<dyn Notifier>,
}

impl Context {
    fn signed_in(&self) -> bool {
        self.session.borrow().is_present()
    }

    fn current_roll_no(&self) -> Option<String> {
        self.session.borrow().get().map(|i| i.roll_no.clone())
    }

    fn record(&self, result: Result<()>) {
        if let Err(e) = result {
            tracing::warn!("Activity log write failed: {:#}", e);
        }
    }
}

pub fn run_once(ctx: &Context, command: &str) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    navigate(ctx, Route::Home);
    handle_command(ctx, &mut rl, command);
    Ok(())
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("campus-pass - type /help for commands, /exit to quit");
    {
        let activity = ctx.activity.borrow();
        if activity.is_enabled() {
            tracing::debug!(path = %activity.path.display(), "Activity log");
        }
    }
    navigate(&ctx, Route::Home);

    loop {
        let prompt = format!("{}> ", ctx.route.borrow().as_str().trim_start_matches('/'));
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                if !line.starts_with('/') {
                    println!("Commands start with '/'. Type /help for the list.");
                    continue;
                }
                if handle_command(&ctx, &mut rl, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    // leaving the home view stops the pass countdown
    ctx.passes.borrow_mut().reset();
    Ok(())
}

/// Enter `route`, subject to the session guards
fn navigate(ctx: &Context, route: Route) {
    let target = gate::resolve(route, ctx.signed_in());
    let previous = ctx.route.replace(target);
    if previous == Route::Home && target != Route::Home {
        ctx.passes.borrow_mut().reset();
    }
    if target != route {
        tracing::debug!(from = %route, to = %target, "Redirected");
    }
    match target {
        Route::Register => println!("== Student login == (/directory, /login)"),
        Route::Home => {
            if let Some(identity) = ctx.session.borrow().get() {
                println!("== Welcome, {} == (/card, /pass, /status, /logout)", identity.name);
            }
        }
    }
}

fn handle_command(ctx: &Context, rl: &mut DefaultEditor, cmd: &str) -> bool {
    let parts: Vec<&str> = cmd.splitn(2, ' ').collect();
    let rest = if parts.len() > 1 { parts[1].trim() } else { "" };
    let route = *ctx.route.borrow();

    match (parts[0], route) {
        ("/exit" | "/quit", _) => return true,
        ("/help", _) => print_help(route),
        ("/go", _) => navigate(ctx, Route::parse(rest)),
        ("/directory", Route::Register) => {
            if let Err(e) = load_directory(ctx, true) {
                ctx.notifier.failure(&e);
            } else {
                print_directory(ctx);
            }
        }
        ("/login", Route::Register) => {
            if let Err(e) = login(ctx, rl, rest) {
                match e.downcast_ref::<AccessError>() {
                    Some(access) => ctx.notifier.failure(access),
                    None => ctx.notifier.error(&format!("{:#}", e)),
                }
            }
        }
        ("/card", Route::Home) => print_card(ctx),
        ("/pass", Route::Home) => generate_pass(ctx),
        ("/qr", Route::Home) => show_qr(ctx, rest == "url"),
        ("/status", Route::Home) => print_status(ctx),
        ("/simulate", Route::Home) => simulate(ctx, rest),
        ("/logout", Route::Home) => logout(ctx),
        (name, _) if is_known(name) => {
            println!("{} is not available on {}. Type /help.", name, route);
        }
        (name, _) => println!("Unknown command: {}. Type /help.", name),
    }
    false
}

fn is_known(name: &str) -> bool {
    matches!(
        name,
        "/directory" | "/login" | "/card" | "/pass" | "/qr" | "/status" | "/simulate" | "/logout"
    )
}

fn print_help(route: Route) {
    println!("Commands:");
    println!("  /exit              - quit");
    println!("  /help              - show commands");
    println!("  /go <home|register> - switch view");
    match route {
        Route::Register => {
            println!("Login:");
            println!("  /directory         - list departments and sections");
            println!("  /login [field=value ...] - verify your details and sign in");
            println!("    fields: name rollNo fatherName email phone deptId secId");
        }
        Route::Home => {
            println!("Pass:");
            println!("  /card              - show your student card");
            println!("  /pass              - generate (or regenerate) your gateway pass");
            println!("  /qr [url]          - show the current pass again, or its image data URL");
            println!("  /status            - time remaining on the pass");
            println!("Gate:");
            println!("  /simulate <granted|denied|alert> - simulate a gate scan");
            println!("  /logout            - sign out");
        }
    }
}

fn load_directory(ctx: &Context, refresh: bool) -> Result<(), AccessError> {
    if !refresh && ctx.directory.borrow().is_some() {
        return Ok(());
    }
    let fetched = directory::fetch_directory(&*ctx.store)?;
    ctx.record(ctx.activity.borrow_mut().directory_loaded(fetched.len()));
    *ctx.directory.borrow_mut() = Some(fetched);
    Ok(())
}

fn print_directory(ctx: &Context) {
    let directory = ctx.directory.borrow();
    let Some(departments) = directory.as_ref() else {
        return;
    };
    if departments.is_empty() {
        println!("No departments configured.");
        return;
    }
    for dept in departments {
        println!("{} ({})", dept.name, dept.id);
        for sec in &dept.sections {
            println!("    {} ({})", sec.name, sec.id);
        }
    }
}

fn login(ctx: &Context, rl: &mut DefaultEditor, args: &str) -> Result<()> {
    let mut fields = parse_fields(args)?;

    for (key, label) in [
        ("name", "Name"),
        ("rollNo", "Roll number"),
        ("fatherName", "Father's name"),
        ("email", "Email"),
        ("phone", "Phone"),
    ] {
        if !fields.contains_key(key) {
            fields.insert(key.to_string(), read_field(rl, label)?);
        }
    }

    if !fields.contains_key("deptId") || !fields.contains_key("secId") {
        load_directory(ctx, false)?;
        let cached = ctx.directory.borrow();
        let departments = cached.as_deref().unwrap_or_default();

        if !fields.contains_key("deptId") {
            let options: Vec<(String, String)> = departments
                .iter()
                .map(|d| (d.id.clone(), d.name.clone()))
                .collect();
            let choice = choose(rl, "Department", &options)?;
            fields.insert("deptId".to_string(), choice);
        }
        if !fields.contains_key("secId") {
            let options: Vec<(String, String)> = directory::find(departments, &fields["deptId"])
                .map(|d| {
                    d.sections
                        .iter()
                        .map(|s| (s.id.clone(), s.name.clone()))
                        .collect()
                })
                .unwrap_or_default();
            let choice = choose(rl, "Section", &options)?;
            fields.insert("secId".to_string(), choice);
        }
    }

    let creds = credentials_from(&fields);
    tracing::debug!(roll_no = %creds.roll_no, "Login submitted");

    let result = {
        let mut session = ctx.session.borrow_mut();
        verify::verify(&*ctx.store, &mut session, &creds)
    };
    match result {
        Ok(identity) => {
            ctx.record(ctx.activity.borrow_mut().login(&identity.roll_no, true, None));
            ctx.notifier.success("Login successful! Welcome.");
            navigate(ctx, Route::Home);
            Ok(())
        }
        Err(e) => {
            ctx.record(ctx.activity.borrow_mut().login(&creds.roll_no, false, Some(e.kind())));
            Err(e.into())
        }
    }
}

fn read_field(rl: &mut DefaultEditor, label: &str) -> Result<String> {
    match rl.readline(&format!("{}: ", label)) {
        Ok(line) => Ok(line.trim().to_string()),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => Err(anyhow!("Login cancelled")),
        Err(e) => Err(e.into()),
    }
}

fn choose(rl: &mut DefaultEditor, label: &str, options: &[(String, String)]) -> Result<String> {
    if options.is_empty() {
        // nothing to pick from; take a raw id and let verification decide
        return read_field(rl, &format!("{} id", label));
    }
    for (i, (id, name)) in options.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, name, id);
    }
    let input = read_field(rl, label)?;
    Ok(pick(&input, options).unwrap_or(input))
}

/// Resolve a menu answer given as a 1-based number, an id or a name
fn pick(input: &str, options: &[(String, String)]) -> Option<String> {
    let input = input.trim();
    if let Ok(n) = input.parse::<usize>() {
        if n >= 1 && n <= options.len() {
            return Some(options[n - 1].0.clone());
        }
    }
    options
        .iter()
        .find(|(id, name)| id == input || name.eq_ignore_ascii_case(input))
        .map(|(id, _)| id.clone())
}

/// Parse `key=value` words; values may be quoted
fn parse_fields(args: &str) -> Result<HashMap<String, String>> {
    let words =
        shell_words::split(args).map_err(|e| anyhow!("Could not parse arguments: {}", e))?;
    let mut fields = HashMap::new();
    for word in words {
        let (key, value) = word
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected field=value, got '{}'", word))?;
        let key = match key {
            "roll" | "rollNo" => "rollNo",
            "father" | "fatherName" => "fatherName",
            "dept" | "deptId" | "departmentId" => "deptId",
            "sec" | "secId" | "sectionId" => "secId",
            "name" | "email" | "phone" => key,
            other => return Err(anyhow!("Unknown field '{}'", other)),
        };
        fields.insert(key.to_string(), value.to_string());
    }
    Ok(fields)
}

fn credentials_from(fields: &HashMap<String, String>) -> Credentials {
    let get = |key: &str| fields.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
    Credentials {
        name: get("name"),
        roll_no: get("rollNo"),
        father_name: get("fatherName"),
        email: get("email"),
        phone: get("phone"),
        dept_id: get("deptId"),
        sec_id: get("secId"),
    }
}

fn print_card(ctx: &Context) {
    let session = ctx.session.borrow();
    let Some(student) = session.get() else {
        return;
    };
    let unknown = "-".to_string();
    println!("Roll number : {}", student.roll_no);
    println!("Name        : {}", student.name);
    println!("Father      : {}", student.father_name);
    println!("Email       : {}", student.email);
    println!("Phone       : {}", student.phone);
    println!(
        "Department  : {}",
        student.department_name.as_ref().unwrap_or(&unknown)
    );
    println!(
        "Section     : {}",
        student.section_name.as_ref().unwrap_or(&unknown)
    );
}

fn generate_pass(ctx: &Context) {
    let result = {
        let session = ctx.session.borrow();
        ctx.passes.borrow_mut().generate(session.get())
    };
    match result {
        Ok(token) => {
            ctx.record(
                ctx.activity
                    .borrow_mut()
                    .pass_generated(&token.roll_no, token.timestamp),
            );
            show_qr(ctx, false);
            println!("Valid for {} seconds.", ctx.config.validity_secs());
            ctx.notifier.info("Secure entry pass generated.");
        }
        Err(e) => ctx.notifier.failure(&e),
    }
}

fn show_qr(ctx: &Context, as_url: bool) {
    let image = ctx.passes.borrow().image();
    let Some(image) = image else {
        println!("No pass yet. Use /pass to generate one.");
        return;
    };
    if as_url {
        println!("{}", image.data_url);
    } else {
        println!("{}", image.terminal);
    }
    print_status(ctx);
}

fn print_status(ctx: &Context) {
    let passes = ctx.passes.borrow();
    tracing::debug!(ticking = passes.is_ticking(), remaining = passes.remaining(), "Pass status");
    if passes.is_expired() {
        println!("TOKEN EXPIRED - use /pass to regenerate");
    } else if passes.phase() == PassPhase::Active {
        println!("Time remaining: {}", passes.formatted_remaining());
    } else {
        println!("No pass yet. Use /pass to generate one.");
    }
}

fn simulate(ctx: &Context, status: &str) {
    tracing::debug!(status, "Simulating gate event");
    let roll_no = ctx.current_roll_no();
    match status {
        "granted" => {
            ctx.notifier.success("Access Granted! Proceed to Entrance.");
            let passes = ctx.passes.borrow();
            if let (PassPhase::Active, Some(token)) = (passes.phase(), passes.token()) {
                if let Err(e) = roster::record_attendance(&*ctx.store, &token) {
                    ctx.notifier.failure(&e);
                }
            }
        }
        "denied" => ctx.notifier.error("Access Denied. See Security Personnel."),
        "alert" => ctx
            .notifier
            .warning("Security Alert: Unauthorized Item Sequence."),
        _ => {
            println!("Usage: /simulate <granted|denied|alert>");
            return;
        }
    }
    ctx.record(ctx.activity.borrow_mut().gate_event(status, roll_no.as_deref()));
}

fn logout(ctx: &Context) {
    let roll_no = ctx.current_roll_no().unwrap_or_default();
    ctx.notifier.info("Logging out...");
    if let Err(e) = ctx.session.borrow_mut().clear() {
        ctx.notifier.error(&format!("Could not clear session: {:#}", e));
        return;
    }
    ctx.record(ctx.activity.borrow_mut().logout(&roll_no));
    navigate(ctx, Route::Register);
}
