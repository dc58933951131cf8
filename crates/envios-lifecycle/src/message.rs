use envios_types::{DeliveryState, NotificationIntent, Shipment};
use serde::{Deserialize, Serialize};

/// Renders the customer-facing status messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplates {
    /// Public tracking page; the ticket is appended to it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_base_url: Option<String>,
}

impl MessageTemplates {
    pub fn new(tracking_base_url: Option<String>) -> Self {
        Self { tracking_base_url }
    }

    pub fn render(&self, ticket: &str, contact_name: &str, state: DeliveryState) -> String {
        let body = match state {
            DeliveryState::Ingresada => format!(
                "Hola {contact_name}, registramos su envío con ticket {ticket}."
            ),
            DeliveryState::AsignadoACourier => format!(
                "Hola {contact_name}, su envío {ticket} está en camino con nuestro repartidor."
            ),
            DeliveryState::Entregado => format!(
                "Hola {contact_name}, su envío {ticket} fue entregado. ¡Gracias por elegirnos!"
            ),
            DeliveryState::NoEntregado => format!(
                "Hola {contact_name}, no pudimos entregar su envío {ticket}. Nos comunicaremos para coordinar una nueva visita."
            ),
        };
        match &self.tracking_base_url {
            Some(base) => format!("{body} Seguimiento: {}/{ticket}", base.trim_end_matches('/')),
            None => body,
        }
    }

    /// Build the intent for the shipment's current state.
    pub fn notification_for(&self, shipment: &Shipment) -> NotificationIntent {
        NotificationIntent {
            shipment_id: shipment.id,
            ticket: shipment.ticket.clone(),
            phone: shipment.contact.phone.clone(),
            state: shipment.state(),
            message: self.render(&shipment.ticket, &shipment.contact.name, shipment.state()),
        }
    }
}
