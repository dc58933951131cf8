use std::fmt::Write as _;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use envios::types::{MessageRecord, Shipment, TrackingView};
use serde::Serialize;

use crate::receiver_of;

fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}

pub(crate) fn render_shipment(s: &Shipment) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "id:       {}", s.id);
    let _ = writeln!(out, "ticket:   {}", s.ticket);
    let _ = writeln!(out, "state:    {}", s.state());
    let _ = writeln!(
        out,
        "address:  {} {}, {}",
        s.address.street, s.address.number, s.address.department
    );
    let _ = writeln!(out, "contact:  {} ({})", s.contact.name, s.contact.phone);
    let _ = writeln!(out, "reason:   {}", s.reason);
    let _ = writeln!(out, "history:");
    for entry in s.history() {
        let _ = write!(out, "  {} {:<20} by {}", ts(&entry.timestamp), entry.state.label(), entry.user_name);
        if let Some(receiver) = receiver_of(&entry.detail) {
            let _ = write!(out, ", received by {receiver}");
        }
        if let Some(url) = entry.detail.evidence_url() {
            let _ = write!(out, ", evidence {url}");
        }
        out.push('\n');
    }
    out
}

pub(crate) fn render_shipments(items: &[Shipment]) -> String {
    if items.is_empty() {
        return "no shipments\n".to_string();
    }
    let mut out = format!(
        "{:<36} {:<14} {:<20} {:<16} {}\n",
        "ID", "TICKET", "STATE", "DEPARTMENT", "CREATED"
    );
    for s in items {
        let _ = writeln!(
            out,
            "{:<36} {:<14} {:<20} {:<16} {}",
            s.id.to_string(),
            s.ticket,
            s.state().label(),
            s.address.department.name(),
            ts(&s.created_at)
        );
    }
    out
}

pub(crate) fn render_tracking(view: &TrackingView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ticket:   {}", view.ticket);
    let _ = writeln!(out, "state:    {}", view.state);
    let _ = writeln!(out, "address:  {} {}, {}", view.street, view.number, view.department);
    let _ = writeln!(out, "contact:  {}", view.contact_name);
    let _ = writeln!(out, "created:  {}", ts(&view.created_at));
    let _ = writeln!(out, "history:");
    for step in &view.history {
        let _ = write!(out, "  {} {}", ts(&step.timestamp), step.state.label());
        if let Some(receiver) = &step.receiver_name {
            let _ = write!(out, " (received by {receiver})");
        }
        out.push('\n');
    }
    out
}

pub(crate) fn render_messages(records: &[MessageRecord]) -> String {
    if records.is_empty() {
        return "no messages\n".to_string();
    }
    let mut out = String::new();
    for r in records {
        let status = if r.sent { "sent" } else { "failed" };
        let _ = writeln!(
            out,
            "{} {:<14} {:<20} {:<6} {} {}",
            ts(&r.timestamp),
            r.ticket,
            r.state.label(),
            status,
            r.phone,
            r.message
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use envios::types::{Actor, DeliveryState, EntryDetail, NewShipment, Role, StatusHistoryEntry, default_reasons};

    fn delivered() -> Shipment {
        let input = NewShipment {
            ticket: "ENV-001".into(),
            street: "Sarandí".into(),
            number: "500".into(),
            department: "Montevideo".into(),
            reason: "Entrega".into(),
            phone: "099123456".into(),
            contact_name: "María Pérez".into(),
            ..Default::default()
        };
        let agent = Actor::new("u-1", "Mostrador", Role::Agent);
        let courier = Actor::new("u-2", "Repartidor", Role::Courier);
        let t0 = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let mut s = Shipment::create(input.validate(&default_reasons()).unwrap(), &agent, t0);
        s.record(StatusHistoryEntry::new(
            DeliveryState::AsignadoACourier,
            &courier,
            t0 + chrono::Duration::hours(1),
            EntryDetail::None,
        ));
        s.record(StatusHistoryEntry::new(
            DeliveryState::Entregado,
            &courier,
            t0 + chrono::Duration::hours(3),
            EntryDetail::Delivered {
                receiver_name: "Ana".into(),
                receiver_id: "1.234.567-8".into(),
                evidence_url: None,
            },
        ));
        s
    }

    #[test]
    fn tracking_text() {
        let view = TrackingView::from(&delivered());
        insta::assert_snapshot!(render_tracking(&view), @r"
        ticket:   ENV-001
        state:    Entregado
        address:  Sarandí 500, Montevideo
        contact:  María Pérez
        created:  2025-03-10T09:00:00Z
        history:
          2025-03-10T09:00:00Z Ingresada
          2025-03-10T10:00:00Z Asignado a courier
          2025-03-10T12:00:00Z Entregado (received by Ana)
        ");
    }

    #[test]
    fn shipment_text_names_receiver() {
        let text = render_shipment(&delivered());
        assert!(text.contains("contact:  María Pérez (099123456)"));
        assert!(text.contains("by Repartidor, received by Ana"));
    }

    #[test]
    fn empty_lists() {
        assert_eq!(render_shipments(&[]), "no shipments\n");
        assert_eq!(render_messages(&[]), "no messages\n");
    }
}
