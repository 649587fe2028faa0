use std::io::{self, BufRead, Write};
use std::sync::Arc;

use news_core::{
    AppConfig, FeedCache, ReactionKind, SessionCoordinator, Transport, ViewOptions, ViewState,
    LIKES_FEED, NEWS_FEED,
};
use tokio::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Home,
    Likes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Rate(ReactionKind),
    Remove(i64),
    Refresh,
    Show(Tab),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let head = words.next()?;
    let command = match head {
        "l" | "like" => Command::Rate(ReactionKind::Accept),
        "n" | "nop" | "skip" => Command::Rate(ReactionKind::Skip),
        "rm" | "remove" => Command::Remove(words.next()?.parse().ok()?),
        "r" | "refresh" | "retry" => Command::Refresh,
        "h" | "home" => Command::Show(Tab::Home),
        "likes" | "liked" => Command::Show(Tab::Likes),
        "?" | "help" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(command)
}

pub struct NewsDeck {
    runtime: Arc<Runtime>,
    home: SessionCoordinator,
    likes: SessionCoordinator,
    tab: Tab,
    stack_size: usize,
}

impl NewsDeck {
    pub fn new(runtime: Arc<Runtime>, transport: Arc<dyn Transport>, config: &AppConfig) -> Self {
        let cache = Arc::new(FeedCache::new(transport.clone(), config.routes()));
        let home_options = ViewOptions::from_config(config, NEWS_FEED).with_dependent(LIKES_FEED);
        let likes_options = ViewOptions::from_config(config, LIKES_FEED).uncapped();

        Self {
            runtime,
            home: SessionCoordinator::new(cache.clone(), transport.clone(), home_options),
            likes: SessionCoordinator::new(cache, transport, likes_options),
            tab: Tab::Home,
            stack_size: config.review.visible_stack.max(1),
        }
    }

    pub fn run(&mut self, input: impl BufRead, mut out: impl Write) -> io::Result<()> {
        let state = self.runtime.block_on(self.home.activate());
        self.render(&state, &mut out)?;

        for line in input.lines() {
            let line = line?;
            let Some(command) = parse_command(&line) else {
                writeln!(out, "unknown command, type ? for help")?;
                continue;
            };
            if command == Command::Quit {
                break;
            }
            if command == Command::Help {
                print_help(&mut out)?;
                continue;
            }
            if let (Command::Remove(id), Tab::Likes) = (&command, self.tab) {
                if !is_listed(&self.likes.state(), *id) {
                    writeln!(out, "no liked article with id {id}")?;
                    continue;
                }
            }
            let state = self.dispatch(command);
            self.render(&state, &mut out)?;
        }

        self.home.deactivate();
        self.likes.deactivate();
        Ok(())
    }

    fn dispatch(&mut self, command: Command) -> ViewState {
        match (command, self.tab) {
            (Command::Show(tab), _) => self.show(tab),
            (Command::Rate(kind), Tab::Home) => self.runtime.block_on(self.home.rate(kind)),
            (Command::Remove(id), Tab::Likes) => self.runtime.block_on(self.likes.remove(id)),
            (Command::Refresh, Tab::Home) => self.runtime.block_on(self.home.refresh(true)),
            (Command::Refresh, Tab::Likes) => self.runtime.block_on(self.likes.refresh(true)),
            (_, Tab::Home) => self.runtime.block_on(self.home.sync()),
            (_, Tab::Likes) => self.runtime.block_on(self.likes.sync()),
        }
    }

    fn show(&mut self, tab: Tab) -> ViewState {
        self.tab = tab;
        match tab {
            Tab::Home => {
                self.likes.deactivate();
                self.runtime.block_on(self.home.activate())
            }
            Tab::Likes => {
                self.home.deactivate();
                self.runtime.block_on(self.likes.activate())
            }
        }
    }

    fn render(&self, state: &ViewState, out: &mut impl Write) -> io::Result<()> {
        writeln!(out)?;
        match self.tab {
            Tab::Home => self.render_home(state, out),
            Tab::Likes => render_likes(state, out),
        }
    }

    fn render_home(&self, state: &ViewState, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "== Latest news ==")?;
        if state.is_loading {
            return writeln!(out, "Loading...");
        }
        if let Some(error) = &state.error {
            writeln!(out, "Error: {error} (r to retry)")?;
        }
        if state.is_caught_up() {
            writeln!(out, "You're all caught up")?;
        } else {
            for (depth, item) in self.home.peek_window(self.stack_size).enumerate() {
                if depth == 0 {
                    writeln!(out, "> {}", item.title)?;
                    writeln!(out, "  {}", item.source)?;
                    writeln!(out, "  {}", item.link)?;
                } else {
                    writeln!(out, "{}{}", "  ".repeat(depth), item.title)?;
                }
            }
            writeln!(
                out,
                "[{} / {}]  l) {}  n) {}",
                state.cursor + 1,
                state.items.len(),
                ReactionKind::Accept.label(),
                ReactionKind::Skip.label()
            )?;
        }
        if let Some(error) = &state.reaction_error {
            writeln!(out, "Failed to submit reaction: {error}")?;
        }
        if let Some(last) = &state.last_reaction {
            writeln!(out, "Recorded {} for \"{}\"", last.kind.label(), last.title)?;
        }
        Ok(())
    }
}

fn render_likes(state: &ViewState, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "== Liked articles ==")?;
    if state.is_loading && !state.has_fetched {
        return writeln!(out, "Loading...");
    }
    if let Some(error) = &state.error {
        writeln!(out, "Error: {error} (r to retry)")?;
    }
    if let Some(error) = &state.reaction_error {
        writeln!(out, "Failed to update reaction: {error}")?;
    }
    if state.has_fetched && state.items.is_empty() && !state.is_refreshing {
        return writeln!(out, "No liked articles yet");
    }
    for item in state.items.iter() {
        writeln!(out, "[{}] {} ({})", item.id, item.title, item.source)?;
        writeln!(out, "      {}", item.link)?;
    }
    if let Some(fetched_at) = state.fetched_at {
        writeln!(out, "updated {}", fetched_at.format("%H:%M:%S"))?;
    }
    Ok(())
}

fn is_listed(state: &ViewState, id: i64) -> bool {
    state.items.iter().any(|item| item.id == id)
}

fn print_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "l / like        like the top card")?;
    writeln!(out, "n / nop         skip the top card")?;
    writeln!(out, "r / refresh     reload the current tab")?;
    writeln!(out, "home / likes    switch tabs")?;
    writeln!(out, "rm <id>         remove an article from likes")?;
    writeln!(out, "q / quit        leave")
}
