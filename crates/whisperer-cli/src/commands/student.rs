use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use whisperer_client::{Route, StudentCourses};

use crate::cli::OutputFormat;
use crate::client::AppContext;
use crate::output::{print_field, print_json, print_table, usage_bar};

pub async fn courses(ctx: &AppContext) -> Result<()> {
    let (token, user) = ctx.require(Route::Chat).await?;
    let courses = ctx.api.student_courses(&token, &user.email).await?;

    if ctx.format == OutputFormat::Json {
        return print_json(&courses);
    }
    print_courses(&courses);
    Ok(())
}

fn print_courses(courses: &StudentCourses) {
    match &courses.program {
        Some(program) => {
            print_field("Program", program.name.bold());
            if let (Some(done), Some(required)) = (program.credits_completed, program.credits_required)
            {
                let pct = if required > 0.0 { done / required * 100.0 } else { 0.0 };
                print_field(
                    "Credits",
                    format!("{done} / {required} {}", usage_bar(pct, 20)),
                );
            }
        }
        None => println!("No program on record."),
    }

    if courses.grades.is_empty() {
        println!("No grades yet.");
        return;
    }
    print_table(
        &["Course", "Grade", "Date", "Feedback"],
        courses.grades.iter().map(|g| {
            vec![
                g.course_name.clone(),
                grade_text(&g.grade),
                g.created_at.clone().unwrap_or_default(),
                g.feedback.clone().unwrap_or_default(),
            ]
        }),
    );
}

/// Grades arrive either as numbers or as letter strings.
fn grade_text(grade: &Value) -> String {
    match grade {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_grade_text() {
        assert_eq!(grade_text(&json!("A")), "A");
        assert_eq!(grade_text(&json!(8.5)), "8.5");
        assert_eq!(grade_text(&Value::Null), "-");
    }
}
