use chrono_tz::Tz;
use simplr_core::{format_local, Task, TaskGroup};

pub fn task_line(task: &Task, tz: Tz) -> String {
    let check = if task.completed { "[x]" } else { "[ ]" };
    let mut line = format!("{check} {}", task.title);
    if let Some(due) = task.due {
        line.push_str(&format!("  (due {})", format_local(due, tz)));
    }
    line.push_str(&format!("  #{}", task.id));
    line
}

pub fn print_groups(groups: &[TaskGroup], tz: Tz) {
    if groups.is_empty() {
        println!("(no tasks)");
        return;
    }
    for g in groups {
        let header = g
            .category
            .as_ref()
            .map_or("Uncategorized", |c| c.name.as_str());
        println!("## {header} ({})", g.len());
        for t in &g.tasks {
            println!("- {}", task_line(t, tz));
        }
        println!();
    }
}

pub fn print_tasks(tasks: &[Task], tz: Tz) {
    if tasks.is_empty() {
        println!("(nothing up next)");
        return;
    }
    for (i, t) in tasks.iter().enumerate() {
        println!("{}. {}", i + 1, task_line(t, tz));
    }
}
