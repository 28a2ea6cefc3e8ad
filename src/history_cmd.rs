use sentinel::config::Config;
use sentinel::diagnosis::parse_reasoning_steps;
use sentinel::history::{self, Decision, DecisionError};
use sentinel::output::{format_num, format_usd, print_json};

fn open_history_conn(cfg: &Config) -> anyhow::Result<rusqlite::Connection> {
    let path = history::db_path(&cfg.history)
        .ok_or_else(|| anyhow::anyhow!("cannot determine history DB path"))?;
    history::open_db(&path)
}

pub fn cmd_history_list(cfg: &Config, limit: usize, json: bool) -> anyhow::Result<i32> {
    let conn = open_history_conn(cfg)?;
    let records = history::list_incidents(&conn, limit)?;

    if json {
        print_json(&records);
        return Ok(0);
    }
    if records.is_empty() {
        eprintln!("[sentinel] no incidents recorded");
        return Ok(0);
    }
    for r in records {
        let fix = if r.fixed_sql.is_some() { "fix" } else { "no fix" };
        println!(
            "{} {} {:8} {} {}/year [{fix}]",
            r.id,
            r.timestamp,
            r.status.as_str(),
            r.task_name,
            format_usd(r.savings.annual_cost_saved_usd),
        );
    }
    Ok(0)
}

pub fn cmd_history_show(cfg: &Config, id: i64, json: bool) -> anyhow::Result<i32> {
    let conn = open_history_conn(cfg)?;
    let Some(r) = history::get_incident(&conn, id)? else {
        eprintln!("[sentinel] incident {id} not found");
        return Ok(1);
    };

    if json {
        print_json(&r);
        return Ok(0);
    }

    println!("ID:         {}", r.id);
    println!("Timestamp:  {}", r.timestamp);
    println!("Task:       {}", r.task_name);
    println!("Status:     {}", r.status);
    if let Some(at) = &r.decided_at {
        println!("Decided:    {at}");
    }
    println!("Schedule:   {}", r.schedule);
    println!("Error:      {}", r.error_message);
    println!();
    println!("--- Original SQL ---");
    println!("{}", r.original_sql);
    println!();
    println!("--- Fixed SQL ---");
    println!(
        "{}",
        r.fixed_sql.as_deref().unwrap_or("No automated fix available")
    );
    if let Some(diagnosis) = &r.diagnosis {
        println!();
        println!("--- Diagnosis ---");
        let steps = parse_reasoning_steps(diagnosis);
        if steps.is_empty() {
            println!("{diagnosis}");
        } else {
            println!("{}", steps.render());
        }
    }
    println!();
    println!("--- Savings ---");
    let s = &r.savings;
    println!(
        "{} warehouse, {:.2} s per run, {}% faster, {} runs/year",
        s.warehouse_size,
        s.avg_execution_time_seconds,
        s.estimated_improvement_pct,
        format_num(i64::try_from(s.executions_per_year).unwrap_or(i64::MAX)),
    );
    println!(
        "{:.6} credits/year, {}/year{}",
        s.annual_credits_saved,
        format_usd(s.annual_cost_saved_usd),
        if s.speculative {
            " (placeholder estimate)"
        } else {
            ""
        }
    );
    Ok(0)
}

pub fn cmd_history_decide(cfg: &Config, id: i64, decision: Decision) -> anyhow::Result<i32> {
    let conn = open_history_conn(cfg)?;
    match history::set_decision(&conn, id, decision) {
        Ok(()) => {
            eprintln!("[sentinel] incident {id} {decision}");
            Ok(0)
        }
        Err(e) => match e.downcast_ref::<DecisionError>() {
            Some(reason) => {
                eprintln!("[sentinel] {reason}");
                Ok(1)
            }
            None => Err(e),
        },
    }
}

pub fn cmd_history_summary(cfg: &Config, json: bool) -> anyhow::Result<i32> {
    let conn = open_history_conn(cfg)?;
    let s = history::summary(&conn)?;

    if json {
        print_json(&s);
        return Ok(0);
    }
    println!("Incidents:        {}", format_num(s.total));
    println!("  pending:        {}", format_num(s.pending));
    println!("  approved:       {}", format_num(s.approved));
    println!("  rejected:       {}", format_num(s.rejected));
    println!("  placeholder:    {}", format_num(s.speculative));
    println!(
        "Potential:        {}/year",
        format_usd(s.total_annual_savings_usd)
    );
    println!(
        "Approved:         {}/year",
        format_usd(s.approved_annual_savings_usd)
    );
    Ok(0)
}

pub fn cmd_history_clear(cfg: &Config) -> anyhow::Result<i32> {
    let conn = open_history_conn(cfg)?;
    history::clear_incidents(&conn)?;
    eprintln!("[sentinel] incident history cleared");
    Ok(0)
}
