// Library Core - Library catalog and lending manager
// Copyright (C) 2025 Library Core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::Context;
use clap::{Parser, Subcommand};
use library_core::{telemetry, Caller, Library, LibraryConfig, NewBook, NewUser};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "library-cli")]
#[command(about = "Library catalog - books, users, borrowing", long_about = None)]
struct Cli {
    /// SQLite database file (overrides LIBRARY_DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// ID of the person running the command
    #[arg(long, global = true, default_value = "L001")]
    caller: String,

    /// Run as a member instead of a librarian
    #[arg(long, global = true)]
    member: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a book to the catalog
    AddBook {
        #[arg(long)]
        isbn: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        genre: Option<String>,
    },
    /// Register a library user
    RegisterUser {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        contact: Option<String>,
    },
    /// Borrow a book for a user
    Borrow { user_id: String, isbn: String },
    /// Return a book borrowed by a user
    Return { user_id: String, isbn: String },
    /// List all books
    Books,
    /// List the books a user currently has out
    Borrowed { user_id: String },
    /// List registered users
    Users,
    /// Show a user's borrow history
    History { user_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = LibraryConfig::from_env().context("Failed to load configuration")?;
    if let Some(path) = cli.database.clone() {
        config.database_path = path;
    }
    telemetry::init_tracing(config.log_json);

    let library = Library::open(&config).await.with_context(|| {
        format!("Failed to open catalog at {}", config.database_path.display())
    })?;

    let caller = if cli.member {
        Caller::member(cli.caller.clone())
    } else {
        Caller::librarian(cli.caller.clone())
    };

    let outcome = run(&library, &caller, &cli).await;
    library.database().clone().close().await?;

    if let Err(e) = outcome {
        eprintln!("Error: {}", e.user_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(library: &Library, caller: &Caller, cli: &Cli) -> library_core::Result<()> {
    match &cli.command {
        Commands::AddBook {
            isbn,
            title,
            author,
            genre,
        } => {
            let mut book = NewBook::new(isbn.clone(), title.clone(), author.clone());
            if let Some(genre) = genre {
                book = book.with_genre(genre.clone());
            }
            let book = library.add_book(caller, book).await?;
            emit(cli.json, &book, || format!("Book added: {} (ISBN: {})", book.title, book.isbn));
        }
        Commands::RegisterUser {
            user_id,
            name,
            contact,
        } => {
            let mut user = NewUser::new(user_id.clone(), name.clone());
            if let Some(contact) = contact {
                user = user.with_contact(contact.clone());
            }
            let user = library.register_user(caller, user).await?;
            emit(cli.json, &user, || format!("User registered: {}", user));
        }
        Commands::Borrow { user_id, isbn } => {
            let record = library.borrow_book(caller, user_id, isbn).await?;
            emit(cli.json, &record, || {
                format!("Borrowed: {} by user {}", record.isbn, record.user_id)
            });
        }
        Commands::Return { user_id, isbn } => {
            let record = library.return_book(caller, user_id, isbn).await?;
            emit(cli.json, &record, || {
                format!("Returned: {} by user {}", record.isbn, record.user_id)
            });
        }
        Commands::Books => {
            let books = library.list_books().await?;
            emit(cli.json, &books, || lines(&books, "No books in the catalog."));
        }
        Commands::Borrowed { user_id } => {
            let books = library.borrowed_books_for(user_id).await?;
            emit(cli.json, &books, || lines(&books, "No books borrowed."));
        }
        Commands::Users => {
            let users = library.queries().all_users().await?;
            emit(cli.json, &users, || lines(&users, "No users registered."));
        }
        Commands::History { user_id } => {
            let records = library.queries().borrow_history_for(user_id).await?;
            emit(cli.json, &records, || {
                if records.is_empty() {
                    return "No borrowing history.".to_string();
                }
                records
                    .iter()
                    .map(|r| match r.return_date {
                        Some(returned) => format!(
                            "#{} {} borrowed {} returned {}",
                            r.id,
                            r.isbn,
                            r.borrow_date.format("%Y-%m-%d %H:%M"),
                            returned.format("%Y-%m-%d %H:%M")
                        ),
                        None => format!(
                            "#{} {} borrowed {} (active)",
                            r.id,
                            r.isbn,
                            r.borrow_date.format("%Y-%m-%d %H:%M")
                        ),
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
    }
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("Failed to serialize output: {}", e),
        }
    } else {
        println!("{}", text());
    }
}

fn lines<T: std::fmt::Display>(items: &[T], empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
