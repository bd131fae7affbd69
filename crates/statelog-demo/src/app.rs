#![forbid(unsafe_code)]

//! Demo application model.
//!
//! Two components hold tracked values: [`Counter`] (`count`) and
//! [`TodoList`] (`todos`, `next_id`). The todo list can be unmounted, which
//! tears its keys out of the registry. [`App`] routes keys to the dashboard
//! first and to the components second.

use serde::Serialize;
use statelog_core::{Registry, TrackOptions, Tracked};
use statelog_dashboard::{Dashboard, KeyCode, KeyEvent, KeyOutcome, Modifiers};
use tracing::debug;

/// One todo entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Todo {
    pub id: u32,
    pub title: String,
    pub done: bool,
}

/// Counter component.
#[derive(Debug)]
pub struct Counter {
    count: Tracked<i64>,
}

impl Counter {
    #[inline(never)]
    pub fn mount(registry: &Registry, options: &TrackOptions) -> Self {
        Self {
            count: Tracked::with_options(registry, "count", 0, options),
        }
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        *self.count.get()
    }

    pub fn increment(&mut self) {
        self.count.update(|n| *n += 1);
    }

    pub fn decrement(&mut self) {
        self.count.update(|n| *n -= 1);
    }
}

/// Todo list component.
#[derive(Debug)]
pub struct TodoList {
    todos: Tracked<Vec<Todo>>,
    next_id: Tracked<u32>,
}

impl TodoList {
    #[inline(never)]
    pub fn mount(registry: &Registry, options: &TrackOptions) -> Self {
        Self {
            todos: Tracked::with_options(registry, "todos", Vec::new(), options),
            next_id: Tracked::with_options(registry, "next_id", 1, options),
        }
    }

    #[must_use]
    pub fn items(&self) -> &[Todo] {
        self.todos.get()
    }

    pub fn add(&mut self) {
        let id = *self.next_id.get();
        self.todos.update(|todos| {
            todos.push(Todo {
                id,
                title: format!("todo #{id}"),
                done: false,
            });
        });
        self.next_id.set(id + 1);
    }

    /// Remove the newest entry. No-op on an empty list.
    pub fn remove_last(&mut self) {
        self.todos.update(|todos| {
            todos.pop();
        });
    }
}

/// What the demo does in response to input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Increment,
    Decrement,
    AddTodo,
    RemoveTodo,
    ToggleTodos,
    MovePanel(i32, i32),
    Quit,
}

impl Action {
    /// Map a key the dashboard did not consume.
    #[must_use]
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.modifiers.contains(Modifiers::ALT) {
            return match key.code {
                KeyCode::Left => Some(Self::MovePanel(-1, 0)),
                KeyCode::Right => Some(Self::MovePanel(1, 0)),
                KeyCode::Up => Some(Self::MovePanel(0, -1)),
                KeyCode::Down => Some(Self::MovePanel(0, 1)),
                _ => None,
            };
        }
        if key.is_char('c', Modifiers::CTRL) {
            return Some(Self::Quit);
        }
        if !(key.modifiers - Modifiers::SHIFT).is_empty() {
            return None;
        }
        match key.code {
            KeyCode::Char('+' | '=') => Some(Self::Increment),
            KeyCode::Char('-') => Some(Self::Decrement),
            KeyCode::Char('a') => Some(Self::AddTodo),
            KeyCode::Char('d') => Some(Self::RemoveTodo),
            KeyCode::Char('t') => Some(Self::ToggleTodos),
            KeyCode::Char('q') => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Whether the event loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The demo: components, their registry, and the dashboard watching it.
#[derive(Debug)]
pub struct App {
    registry: Registry,
    options: TrackOptions,
    counter: Counter,
    todos: Option<TodoList>,
    dashboard: Dashboard,
}

impl App {
    /// Mount both components and the dashboard.
    pub fn new(registry: Registry, options: TrackOptions, mut dashboard: Dashboard) -> Self {
        dashboard.mount();
        let counter = Counter::mount(&registry, &options);
        let todos = Some(TodoList::mount(&registry, &options));
        Self {
            registry,
            options,
            counter,
            todos,
            dashboard,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn counter(&self) -> &Counter {
        &self.counter
    }

    #[must_use]
    pub fn todos(&self) -> Option<&TodoList> {
        self.todos.as_ref()
    }

    #[must_use]
    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn dashboard_mut(&mut self) -> &mut Dashboard {
        &mut self.dashboard
    }

    pub fn apply(&mut self, action: Action) -> Flow {
        debug!(?action, "apply");
        match action {
            Action::Increment => self.counter.increment(),
            Action::Decrement => self.counter.decrement(),
            Action::AddTodo => {
                if let Some(todos) = self.todos.as_mut() {
                    todos.add();
                }
            }
            Action::RemoveTodo => {
                if let Some(todos) = self.todos.as_mut() {
                    todos.remove_last();
                }
            }
            Action::ToggleTodos => {
                self.todos = match self.todos.take() {
                    Some(_unmounted) => None,
                    None => Some(TodoList::mount(&self.registry, &self.options)),
                };
            }
            Action::MovePanel(dx, dy) => self.dashboard.move_by(dx, dy),
            Action::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    pub fn handle_key(&mut self, key: &KeyEvent) -> Flow {
        if self.dashboard.handle_key(key) != KeyOutcome::Ignored {
            return Flow::Continue;
        }
        match Action::from_key(key) {
            Some(action) => self.apply(action),
            None => Flow::Continue,
        }
    }

    /// Component area text, one line per row.
    #[must_use]
    pub fn body_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Counter: {}", self.counter.value()),
            String::new(),
        ];
        match &self.todos {
            Some(todos) if todos.items().is_empty() => lines.push("Todos: (none)".into()),
            Some(todos) => {
                lines.push("Todos:".into());
                for todo in todos.items() {
                    let mark = if todo.done { "x" } else { " " };
                    lines.push(format!("  [{mark}] {}", todo.title));
                }
            }
            None => lines.push("Todos: unmounted (t to mount)".into()),
        }
        lines.push(String::new());
        lines.push("+/- count  a/d todo  t mount/unmount  Alt+arrows move  q quit".into());
        lines
    }
}
