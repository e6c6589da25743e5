//! Write a few records to an xlsx file and read them back

use chrono::NaiveDate;
use excelbind::{read_excel, read_file, record_fields, write_file, Record, WriteConfig};

#[derive(Debug, Default)]
struct Employee {
    name: String,
    age: u32,
    active: bool,
    joined: NaiveDate,
    manager: Option<String>,
}

impl Record for Employee {
    record_fields! {
        name { excel = "姓名" },
        age { excel = "年龄" },
        active { excel = "在职" },
        joined { excel = "入职日期" },
        manager { excel = "主管" },
    }

    fn configure_write(&self, config: &mut WriteConfig) {
        config.sheet_name = "员工".to_string();
        config.localized_bool = true;
        config.write_time_format = "yyyy-mm-dd".to_string();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let employees = vec![
        Employee {
            name: "Alice".to_string(),
            age: 34,
            active: true,
            joined: NaiveDate::from_ymd_opt(2019, 4, 1).unwrap_or_default(),
            manager: None,
        },
        Employee {
            name: "Bob".to_string(),
            age: 27,
            active: false,
            joined: NaiveDate::from_ymd_opt(2022, 9, 15).unwrap_or_default(),
            manager: Some("Alice".to_string()),
        },
    ];

    write_file("demos/employees.xlsx", &employees)?;
    println!("Wrote {} employees to demos/employees.xlsx", employees.len());

    // Raw rows
    read_excel("demos/employees.xlsx", 0, |index, row| {
        println!("Row {}: {:?}", index + 1, row.to_strings());
    })?;

    // Typed records, active ones only
    let active = read_file::<Employee, _>("demos/employees.xlsx", &[&|e: &Employee| e.active])?;
    for employee in &active {
        println!("Active: {:?}", employee);
    }

    Ok(())
}
