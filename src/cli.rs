// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{crate_version, Arg, ArgAction, Command};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .help("Print as pretty JSON")
            .action(ArgAction::SetTrue),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .help("Print as JSON lines")
            .action(ArgAction::SetTrue),
    )
}

fn id_arg() -> Arg {
    Arg::new("id")
        .long("id")
        .required(true)
        .value_parser(clap::value_parser!(i64))
}

pub fn build_cli() -> Command {
    Command::new("budgetbuddy")
        .version(crate_version!())
        .about("Personal expense, budget, and wallet tracking with spreadsheet backup")
        .subcommand(Command::new("init").about("Initialize the local database"))
        .subcommand(
            Command::new("expense")
                .about("Record and browse expenses")
                .subcommand(
                    Command::new("add")
                        .about("Record an expense")
                        .arg(Arg::new("date").long("date").required(true).help("YYYY-MM-DD"))
                        .arg(Arg::new("type").long("type").required(true).help("Expense category"))
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(Arg::new("notes").long("notes")),
                )
                .subcommand(json_flags(
                    Command::new("list")
                        .about("List expenses")
                        .arg(Arg::new("month").long("month").help("Filter by YYYY-MM"))
                        .arg(Arg::new("type").long("type").help("Filter by category")),
                ))
                .subcommand(
                    Command::new("edit")
                        .about("Edit an expense")
                        .arg(id_arg())
                        .arg(Arg::new("date").long("date"))
                        .arg(Arg::new("type").long("type"))
                        .arg(Arg::new("amount").long("amount"))
                        .arg(Arg::new("notes").long("notes")),
                )
                .subcommand(Command::new("rm").about("Delete an expense").arg(id_arg())),
        )
        .subcommand(
            Command::new("budget")
                .about("Set and browse monthly budgets")
                .subcommand(
                    Command::new("set")
                        .about("Set the budget for a month/category")
                        .arg(Arg::new("month").long("month").required(true).help("YYYY-MM"))
                        .arg(Arg::new("type").long("type").required(true))
                        .arg(Arg::new("amount").long("amount").required(true)),
                )
                .subcommand(json_flags(
                    Command::new("list")
                        .about("List budgets")
                        .arg(Arg::new("month").long("month").help("Filter by YYYY-MM")),
                ))
                .subcommand(Command::new("rm").about("Delete a budget").arg(id_arg())),
        )
        .subcommand(
            Command::new("wallet")
                .about("Track wallet top-ups and withdrawals")
                .subcommand(
                    Command::new("add")
                        .about("Record a wallet movement (negative for withdrawals)")
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(Arg::new("notes").long("notes"))
                        .arg(
                            Arg::new("date")
                                .long("date")
                                .help("Backdate the entry to YYYY-MM-DD"),
                        ),
                )
                .subcommand(json_flags(Command::new("list").about("List wallet entries")))
                .subcommand(
                    Command::new("edit")
                        .about("Edit a wallet entry")
                        .arg(id_arg())
                        .arg(Arg::new("amount").long("amount"))
                        .arg(Arg::new("notes").long("notes")),
                )
                .subcommand(Command::new("rm").about("Delete a wallet entry").arg(id_arg()))
                .subcommand(json_flags(
                    Command::new("balance")
                        .about("Show wallet balance figures")
                        .arg(Arg::new("as-of").long("as-of").help("Balance as of YYYY-MM-DD")),
                )),
        )
        .subcommand(
            Command::new("reminder")
                .about("Keep dated reminder notes")
                .subcommand(
                    Command::new("add")
                        .about("Add a reminder")
                        .arg(Arg::new("notes").long("notes").required(true))
                        .arg(
                            Arg::new("due")
                                .long("due")
                                .required(true)
                                .help("Due date/time as 'YYYY-MM-DD HH:MM'"),
                        ),
                )
                .subcommand(json_flags(Command::new("list").about("List reminders")))
                .subcommand(Command::new("rm").about("Delete a reminder").arg(id_arg())),
        )
        .subcommand(
            Command::new("backup")
                .about("Mirror local data into a remote spreadsheet")
                .subcommand(
                    Command::new("connect")
                        .about("Store the remote session produced by the auth flow")
                        .arg(Arg::new("token").long("token").required(true))
                        .arg(Arg::new("name").long("name"))
                        .arg(Arg::new("email").long("email")),
                )
                .subcommand(Command::new("status").about("Show sync state and pending counts"))
                .subcommand(Command::new("sync").about("Sync now"))
                .subcommand(
                    Command::new("tick")
                        .about("Headless scheduled sync (nonzero exit asks for a retry)"),
                ),
        )
}
