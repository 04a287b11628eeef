// src/services/document_service.rs

use genpdf::{elements, style, Element};
use rust_decimal::Decimal;

use crate::{
    common::error::AppError,
    models::billing::{InvoiceDetailRow, InvoiceReport},
};

const FONT_FAMILY: &str = "Roboto";

pub fn money(amount: Decimal) -> String {
    format!("$ {:.2}", amount)
}

/// Linha da tabela impressa: Alumno, Concepto, Fecha de pago, Método, Monto.
pub fn detail_cells(row: &InvoiceDetailRow) -> [String; 5] {
    [
        format!("{} ({})", row.member_name, row.member_dni),
        row.concept.clone(),
        row.payment_date
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "-".to_string()),
        row.payment_method
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string()),
        money(row.amount),
    ]
}

#[derive(Debug, Clone)]
pub struct DocumentService {
    fonts_dir: String,
}

impl DocumentService {
    pub fn new(fonts_dir: impl Into<String>) -> Self {
        Self { fonts_dir: fonts_dir.into() }
    }

    pub fn render_invoice_pdf(&self, report: &InvoiceReport) -> Result<Vec<u8>, AppError> {
        let invoice = &report.invoice;

        // Carrega a fonte da pasta configurada
        let font_family = genpdf::fonts::from_files(&self.fonts_dir, FONT_FAMILY, None).map_err(|e| {
            AppError::Document(format!("fuente '{}' no encontrada en {}: {}", FONT_FAMILY, self.fonts_dir, e))
        })?;

        let mut doc = genpdf::Document::new(font_family);
        doc.set_title(format!("Facturación #{}", invoice.id));
        let mut decorator = genpdf::SimplePageDecorator::new();
        decorator.set_margins(10);
        doc.set_page_decorator(decorator);

        // --- CABEÇALHO ---
        doc.push(
            elements::Paragraph::new(format!("FACTURACIÓN #{}", invoice.id))
                .styled(style::Style::new().bold().with_font_size(16)),
        );
        let titular = match &invoice.titular_dni {
            Some(dni) => format!("Titular: {} (DNI {})", invoice.titular, dni),
            None => format!("Titular: {}", invoice.titular),
        };
        doc.push(elements::Paragraph::new(titular));
        doc.push(elements::Paragraph::new(format!(
            "Período: {} al {}",
            invoice.period_start.format("%d/%m/%Y"),
            invoice.period_end.format("%d/%m/%Y")
        )));
        doc.push(elements::Paragraph::new(format!(
            "Generada: {}",
            invoice.generated_at.format("%d/%m/%Y %H:%M")
        )));

        doc.push(elements::Break::new(1.5));

        // --- TABELA ---
        let mut table = elements::TableLayout::new(vec![4, 3, 2, 2, 2]);
        table.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));

        let bold = style::Style::new().bold();
        let mut header = table.row();
        for title in ["Alumno", "Concepto", "Fecha", "Método", "Monto"] {
            header.push_element(elements::Paragraph::new(title).styled(bold));
        }
        header.push().map_err(|e| AppError::Document(e.to_string()))?;

        for row in &report.details {
            let mut line = table.row();
            for cell in detail_cells(row) {
                line.push_element(elements::Paragraph::new(cell));
            }
            line.push().map_err(|e| AppError::Document(e.to_string()))?;
        }

        doc.push(table);
        doc.push(elements::Break::new(1.5));

        // --- TOTAIS ---
        let mut count = elements::Paragraph::new(format!("Cuotas: {}", invoice.due_count));
        count.set_alignment(genpdf::Alignment::Right);
        doc.push(count);

        let mut total = elements::Paragraph::new(format!("TOTAL: {}", money(invoice.total_amount)));
        total.set_alignment(genpdf::Alignment::Right);
        doc.push(total.styled(style::Style::new().bold().with_font_size(12)));

        // Renderiza para buffer em memória
        let mut buffer = Vec::new();
        doc.render(&mut buffer).map_err(|e| AppError::Document(e.to_string()))?;

        Ok(buffer)
    }
}
