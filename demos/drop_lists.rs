//! Drop-down lists: keys in the records, display values in the sheet

use excelbind::{
    read_binary, record_fields, to_bytes, DropItem, ExcelError, ReadConfig, Record,
    UnmarshalErrorHandling, WriteConfig,
};

#[derive(Debug, Default)]
struct Ticket {
    id: u32,
    priority: String,
    status: Option<String>,
}

fn priorities() -> Vec<DropItem> {
    vec![
        DropItem::new("P1", "紧急"),
        DropItem::new("P2", "重要"),
        DropItem::new("P3", "普通"),
    ]
}

impl Record for Ticket {
    record_fields! {
        id { excel = "编号" },
        priority { excel = "优先级" },
        status { excel = "状态" },
    }

    fn configure_read(config: &mut ReadConfig) {
        config.drop_lists.insert("优先级".to_string(), priorities());
        config.pointer_can_nil = true;
        config.unmarshal_error_handling = UnmarshalErrorHandling::Collect;
    }

    fn configure_write(&self, config: &mut WriteConfig) {
        config.drop_lists.insert("优先级".to_string(), priorities());
        config.sheet_name = "工单".to_string();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tickets = vec![
        Ticket {
            id: 1,
            priority: "P1".to_string(),
            status: Some("open".to_string()),
        },
        Ticket {
            id: 2,
            priority: "P3".to_string(),
            status: None,
        },
    ];

    let bytes = to_bytes(&tickets)?;
    std::fs::write("demos/tickets.xlsx", &bytes)?;
    println!("Wrote demos/tickets.xlsx ({} bytes)", bytes.len());

    match read_binary::<Ticket>(&bytes, &[]) {
        Ok(read_back) => {
            for ticket in read_back {
                println!("{:?}", ticket);
            }
        }
        Err(ExcelError::Content(errors)) => {
            for error in errors.iter() {
                println!("{}", error);
            }
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
